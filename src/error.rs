// Tala Error Handling Module
// Positioned errors with help text, source excerpts and stack traces

use colored::*;
use std::fmt;

/// A position in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

/// A span in the source code (start to end position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn from_positions(
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start: Position::new(start_line, start_col, 0),
            end: Position::new(end_line, end_col, 0),
        }
    }

    pub fn single(line: usize, column: usize, offset: usize) -> Self {
        let pos = Position::new(line, column, offset);
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Span covering both `self` and `other`
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }
}

/// Types of errors in Tala
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    NameError,
    TypeError,
    ArgumentError,
    DivisionByZero,
    RuntimeError,
    /// A guest-language exception surfaced in host code
    ForeignError,
    /// Deployment defect, e.g. an unsupported guest language
    ConfigurationError,
    /// A fault that is not a language-level error
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::SyntaxError => write!(f, "SyntaxError"),
            ErrorKind::NameError => write!(f, "NameError"),
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ArgumentError => write!(f, "ArgumentError"),
            ErrorKind::DivisionByZero => write!(f, "DivisionByZero"),
            ErrorKind::RuntimeError => write!(f, "RuntimeError"),
            ErrorKind::ForeignError => write!(f, "ForeignError"),
            ErrorKind::ConfigurationError => write!(f, "ConfigurationError"),
            ErrorKind::InternalError => write!(f, "InternalError"),
        }
    }
}

/// A stack frame for error traces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function_name: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl StackFrame {
    pub fn new(
        function_name: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  at {} ({}:{}:{})",
            self.function_name, self.file, self.line, self.column
        )
    }
}

/// Main error type for Tala
#[derive(Debug, Clone)]
pub struct TalaError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    pub file: String,
    pub help: Option<String>,
    pub stack_trace: Vec<StackFrame>,
    source_lines: Vec<String>,
}

impl TalaError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        span: Span,
        file: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            file: file.into(),
            help: None,
            stack_trace: Vec::new(),
            source_lines: Vec::new(),
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source_lines = source.lines().map(String::from).collect();
        self
    }

    pub fn with_stack_trace(mut self, trace: Vec<StackFrame>) -> Self {
        self.stack_trace = trace;
        self
    }

    pub fn push_frame(&mut self, frame: StackFrame) {
        self.stack_trace.push(frame);
    }

    /// Stack trace rendered one frame per line, innermost first
    pub fn trace_lines(&self) -> Vec<String> {
        self.stack_trace.iter().map(|f| f.to_string()).collect()
    }

    /// One-line summary without colors, used on the debugger wire
    pub fn summary(&self) -> String {
        format!(
            "{}: {} at {}:{}:{}",
            self.kind, self.message, self.file, self.span.start.line, self.span.start.column
        )
    }

    /// Format the error for terminal display
    pub fn format(&self) -> String {
        let mut output = String::new();

        let header = format!(
            "{}: {} at {}:{}:{}",
            self.kind.to_string().red().bold(),
            self.message.white().bold(),
            self.file,
            self.span.start.line,
            self.span.start.column
        );
        output.push_str(&header);
        output.push('\n');

        // Source context: the line before, the error line, the line after
        if !self.source_lines.is_empty() {
            let error_line = self.span.start.line;
            let start_line = if error_line > 1 { error_line - 1 } else { 1 };
            let end_line = (error_line + 1).min(self.source_lines.len());

            output.push('\n');

            for line_num in start_line..=end_line {
                if line_num > self.source_lines.len() {
                    continue;
                }
                let line_content = &self.source_lines[line_num - 1];
                let line_num_str = format!("{:>4} |", line_num);

                if line_num == error_line {
                    output.push_str(&format!("{} {}\n", line_num_str.red(), line_content));

                    let spaces = " ".repeat(6 + self.span.start.column);
                    let caret_len = if self.span.end.line == self.span.start.line
                        && self.span.end.column > self.span.start.column
                    {
                        self.span.end.column - self.span.start.column + 1
                    } else {
                        1
                    };
                    let carets = "^".repeat(caret_len);
                    output.push_str(&format!("{}{}\n", spaces, carets.red().bold()));
                } else {
                    output.push_str(&format!("{} {}\n", line_num_str.dimmed(), line_content));
                }
            }
        }

        if let Some(ref help) = self.help {
            output.push_str(&format!("\n      {}: {}\n", "Help".cyan().bold(), help));
        }

        if !self.stack_trace.is_empty() {
            output.push_str(&format!("\n{}:\n", "Stack trace".yellow().bold()));
            for frame in self.stack_trace.iter() {
                output.push_str(&format!("{}\n", frame));
            }
        }

        output
    }
}

impl fmt::Display for TalaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl std::error::Error for TalaError {}

/// Result type for Tala operations
pub type TalaResult<T> = Result<T, TalaError>;

// Convenience constructors for common errors
impl TalaError {
    pub fn syntax_error(message: impl Into<String>, span: Span, file: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message, span, file)
    }

    pub fn name_error(message: impl Into<String>, span: Span, file: impl Into<String>) -> Self {
        Self::new(ErrorKind::NameError, message, span, file)
    }

    pub fn type_error(message: impl Into<String>, span: Span, file: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message, span, file)
    }

    pub fn argument_error(message: impl Into<String>, span: Span, file: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentError, message, span, file)
    }

    pub fn runtime_error(message: impl Into<String>, span: Span, file: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message, span, file)
    }

    pub fn division_by_zero(span: Span, file: impl Into<String>) -> Self {
        Self::new(ErrorKind::DivisionByZero, "Division by zero", span, file)
    }

    pub fn internal_error(message: impl Into<String>, span: Span, file: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message, span, file)
    }
}
