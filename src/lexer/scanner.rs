// Tala Scanner (Lexer)
// Converts source code into tokens

use crate::error::{Span, TalaError, TalaResult};
use crate::lexer::token::{Token, TokenKind};

/// Scanner that tokenizes Tala source code
pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    start_line: usize,
    start_column: usize,
    file: String,
}

impl Scanner {
    pub fn new(source: &str, file: impl Into<String>) -> Self {
        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            file: file.into(),
        }
    }

    /// Scan all tokens from the source
    pub fn scan_tokens(mut self) -> TalaResult<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_line = self.line;
            self.start_column = self.column;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            "",
            Span::single(self.line, self.column, self.current),
        ));

        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> TalaResult<()> {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '{' => self.add_token(TokenKind::LeftBrace),
            '}' => self.add_token(TokenKind::RightBrace),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            ',' => self.add_token(TokenKind::Comma),
            '.' => self.add_token(TokenKind::Dot),
            ';' => self.add_token(TokenKind::Semicolon),
            '+' => self.add_token(TokenKind::Plus),
            '-' => self.add_token(TokenKind::Minus),
            '*' => self.add_token(TokenKind::Star),
            '%' => self.add_token(TokenKind::Percent),
            '/' => {
                if self.match_char('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_char('*') {
                    self.block_comment()?;
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }
            '!' => {
                let kind = if self.match_char('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.add_token(kind);
            }
            '=' => {
                let kind = if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.add_token(kind);
            }
            '<' => {
                let kind = if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.add_token(kind);
            }
            '>' => {
                let kind = if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.add_token(kind);
            }
            '&' => {
                if self.match_char('&') {
                    self.add_token(TokenKind::And);
                } else {
                    return Err(self
                        .error("Unexpected character '&'")
                        .with_help("Use '&&' for logical and"));
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenKind::Or);
                } else {
                    return Err(self
                        .error("Unexpected character '|'")
                        .with_help("Use '||' for logical or"));
                }
            }

            ' ' | '\r' | '\t' => {}
            '\n' => {
                self.line += 1;
                self.column = 1;
            }

            '"' => {
                if self.peek() == '"' && self.peek_next() == '"' {
                    self.advance();
                    self.advance();
                    self.raw_string()?;
                } else {
                    self.string('"')?;
                }
            }
            '\'' => self.string('\'')?,

            c if c.is_ascii_digit() => self.number()?,
            c if c.is_alphabetic() || c == '_' => self.identifier(),

            _ => {
                return Err(self
                    .error(&format!("Unexpected character '{}'", c))
                    .with_help("Remove this character or check for typos"));
            }
        }

        Ok(())
    }

    fn string(&mut self, quote_char: char) -> TalaResult<()> {
        let start_line = self.line;
        let start_col = self.start_column;

        while self.peek() != quote_char && !self.is_at_end() {
            if self.peek() == '\\' {
                self.advance();
                if !self.is_at_end() {
                    if self.peek() == '\n' {
                        self.newline();
                    }
                    self.advance();
                }
            } else {
                if self.peek() == '\n' {
                    self.newline();
                }
                self.advance();
            }
        }

        if self.is_at_end() {
            return Err(TalaError::syntax_error(
                "Unterminated string",
                Span::from_positions(start_line, start_col, self.line, self.column),
                &self.file,
            )
            .with_help(format!("Add a closing {} to terminate the string", quote_char)));
        }

        self.advance();

        let value: String = self.source[self.start + 1..self.current - 1].iter().collect();
        let processed = self.process_escapes(&value)?;
        self.add_token(TokenKind::String(processed));
        Ok(())
    }

    /// `"""..."""`: verbatim text, used for embedded guest sources
    fn raw_string(&mut self) -> TalaResult<()> {
        let start_line = self.line;
        let start_col = self.start_column;
        let mut value = String::new();

        while !self.is_at_end() {
            if self.peek() == '"'
                && self.peek_next() == '"'
                && self.source.get(self.current + 2) == Some(&'"')
            {
                self.advance();
                self.advance();
                self.advance();
                self.add_token(TokenKind::RawString(value));
                return Ok(());
            }

            if self.peek() == '\n' {
                self.newline();
            }
            value.push(self.advance());
        }

        Err(TalaError::syntax_error(
            "Unterminated raw string",
            Span::from_positions(start_line, start_col, self.line, self.column),
            &self.file,
        )
        .with_help("Add \"\"\" to close the raw string"))
    }

    fn process_escapes(&self, s: &str) -> TalaResult<String> {
        let mut result = String::with_capacity(s.len());
        let mut chars = s.chars();

        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('0') => result.push('\0'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some('\n') => {}
                Some(other) => {
                    return Err(self
                        .error(&format!("Invalid escape sequence '\\{}'", other))
                        .with_help("Valid escapes: \\n, \\t, \\r, \\0, \\\\, \\\", \\'"));
                }
                None => {
                    return Err(self.error("Unexpected end of string after '\\'"));
                }
            }
        }

        Ok(result)
    }

    fn number(&mut self) -> TalaResult<()> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let kind = if is_float {
            TokenKind::Number(
                lexeme
                    .parse()
                    .map_err(|_| self.error(&format!("Invalid number '{}'", lexeme)))?,
            )
        } else {
            // Literals wider than i64 fall back to floating point
            match lexeme.parse::<i64>() {
                Ok(n) => TokenKind::Integer(n),
                Err(_) => TokenKind::Number(
                    lexeme
                        .parse()
                        .map_err(|_| self.error(&format!("Invalid number '{}'", lexeme)))?,
                ),
            }
        };

        self.add_token(kind);
        Ok(())
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let kind = match text.as_str() {
            "let" => TokenKind::Let,
            "fn" => TokenKind::Fn,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "foreign" => TokenKind::Foreign,
            "breakpoint" => TokenKind::Breakpoint,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nothing" => TokenKind::Nothing,
            _ => TokenKind::Identifier(text),
        };
        self.add_token(kind);
    }

    fn block_comment(&mut self) -> TalaResult<()> {
        let start_line = self.line;
        let start_col = self.start_column;
        let mut depth = 1;

        while depth > 0 && !self.is_at_end() {
            if self.peek() == '/' && self.peek_next() == '*' {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                depth -= 1;
            } else {
                if self.peek() == '\n' {
                    self.newline();
                }
                self.advance();
            }
        }

        if depth > 0 {
            return Err(TalaError::syntax_error(
                "Unterminated block comment",
                Span::from_positions(start_line, start_col, self.line, self.column),
                &self.file,
            )
            .with_help("Add '*/' to close the block comment"));
        }

        Ok(())
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    // Called while positioned on a '\n' that is about to be consumed;
    // `advance` then moves the column back to 1.
    fn newline(&mut self) {
        self.line += 1;
        self.column = 0;
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.current += 1;
            self.column += 1;
            true
        }
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let span = Span::from_positions(
            self.start_line,
            self.start_column,
            self.line,
            self.column.saturating_sub(1),
        );
        self.tokens.push(Token::new(kind, lexeme, span));
    }

    fn error(&self, message: &str) -> TalaError {
        TalaError::syntax_error(
            message,
            Span::from_positions(self.start_line, self.start_column, self.line, self.column),
            &self.file,
        )
    }
}
