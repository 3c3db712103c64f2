// Tala CLI - Command Line Interface
// Usage: tala [FILE] [OPTIONS]

use clap::Parser;
use colored::*;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::borrow::Cow;
use std::convert::Infallible;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tala_core::debugger::{DebugServer, ReplSession, SessionManager, TcpTransport};
use tala_core::instrument::Unwind;
use tala_core::{Interpreter, Options, Value};

/// Tala - run programs with an interactive halt-point debugger
#[derive(Parser)]
#[command(name = "tala")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Tala programs with an interactive halt-point debugger", long_about = None)]
struct Cli {
    /// Source file to run (.tala)
    file: Option<PathBuf>,

    /// Execute inline code
    #[arg(short = 'e', long = "exec")]
    exec: Option<String>,

    /// Open a debugger prompt in this terminal at every breakpoint()
    #[arg(long = "repl-debugger")]
    repl_debugger: bool,

    /// Serve breakpoint sessions to a debugger listening at this address
    #[arg(long = "attach", value_name = "ADDR")]
    attach: Option<String>,

    /// Configuration file (defaults to ./tala.toml when present)
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TALA_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let options = Options::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    let enabled = options.repl_debugger_enabled() || cli.repl_debugger || cli.attach.is_some();
    let options = options.repl_debugger(enabled);

    let mut builder = Interpreter::builder().options(options);
    if let Some(address) = &cli.attach {
        let server = DebugServer::start(&TcpTransport::new(address.clone()))
            .map_err(|e| format!("Cannot reach debugger at {}: {}", address, e))?;
        builder = builder.debug_server(server);
    } else if enabled {
        builder = builder.debug_server(DebugServer::with_manager(TerminalDebugger::new()));
    }
    let interpreter = builder.build();

    let (source, file_name, print_result) = if let Some(code) = cli.exec {
        (code, "<exec>".to_string(), true)
    } else if let Some(path) = cli.file {
        let source = fs::read_to_string(&path)
            .map_err(|e| format!("Error reading file '{}': {}", path.display(), e))?;
        (source, path.to_string_lossy().to_string(), false)
    } else {
        return Err(format!(
            "{} Nothing to run. Pass a file or use {}",
            "!".red(),
            "-e <code>".cyan()
        ));
    };

    let result = interpreter
        .run_source(&source, &file_name, Value::Nothing)
        .map_err(|e| e.format())?;
    if print_result && !result.value.is_nothing() {
        println!("{}", result.value);
    }
    Ok(())
}

/// Session manager that talks to the user on this terminal
struct TerminalDebugger {
    history: Option<PathBuf>,
    /// One prompt at a time when several threads halt together. A halt nested
    /// inside an evaluation re-enters on the same thread.
    terminal: ReentrantMutex<()>,
}

impl TerminalDebugger {
    fn new() -> Self {
        Self {
            history: dirs::home_dir().map(|home| home.join(".tala_debug_history")),
            terminal: ReentrantMutex::new(()),
        }
    }

    fn hold_terminal(&self) -> ReentrantMutexGuard<'_, ()> {
        self.terminal.lock()
    }

    fn editor(&self) -> reedline::Reedline {
        let editor = reedline::Reedline::create();
        let Some(path) = &self.history else {
            return editor;
        };
        match reedline::FileBackedHistory::with_file(1000, path.clone()) {
            Ok(history) => editor.with_history(Box::new(history)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "debugger history unavailable");
                editor
            }
        }
    }

    fn drive(&self, session: &mut ReplSession<'_>) {
        use reedline::Signal;

        let location = session.location();
        println!();
        println!(
            "  {} {}:{} {}",
            "Halted at".cyan().bold(),
            session.file(),
            location.start.line,
            format!("(session {})", session.id()).bright_black()
        );
        println!("  {}", "Type :help for commands, :exit to resume".bright_black());

        let mut editor = self.editor();
        let prompt = DebugPrompt {
            label: format!("debug{}> ", session.id()),
        };

        loop {
            match editor.read_line(&prompt) {
                Ok(Signal::Success(line)) => {
                    let input = line.trim();
                    match input {
                        "" => continue,
                        ":exit" | ":continue" | ":c" => break,
                        ":help" => print_help(),
                        ":list" | ":l" => print_bindings(session),
                        _ if input.starts_with(':') => {
                            println!("{} Unknown command: {}", "!".red(), input);
                            println!("  Type {} for available commands", ":help".cyan());
                        }
                        _ => match session.evaluate(input) {
                            Ok(value) => print_value(session, &value),
                            Err(e) => eprintln!("{}", e.format()),
                        },
                    }
                }
                Ok(Signal::CtrlC) => {
                    println!("{}", "^C".bright_black());
                }
                Ok(Signal::CtrlD) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "debugger prompt failed, resuming");
                    break;
                }
            }
        }
        println!("{}", "  Resuming".bright_black());
    }
}

impl SessionManager for TerminalDebugger {
    fn start_session(&self, mut session: ReplSession<'_>) -> Result<Infallible, Unwind> {
        let _terminal = self.hold_terminal();
        self.drive(&mut session);
        session.exit()
    }
}

struct DebugPrompt {
    label: String,
}

impl reedline::Prompt for DebugPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.label)
    }
    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }
    fn render_prompt_indicator(&self, _: reedline::PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }
    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }
    fn render_prompt_history_search_indicator(
        &self,
        history_search: reedline::PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            reedline::PromptHistorySearchStatus::Passing => "",
            reedline::PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}reverse-search: {}) ", prefix, history_search.term))
    }
}

fn print_value(session: &ReplSession<'_>, value: &Value) {
    match session.show(value) {
        Ok(text) => println!("{}", colorize(value, text)),
        Err(e) => eprintln!("{}", e.format()),
    }
}

fn colorize(value: &Value, text: String) -> ColoredString {
    match value {
        Value::Nothing => text.bright_black(),
        Value::Boolean(_) => text.yellow(),
        Value::Integer(_) | Value::Number(_) => text.yellow(),
        Value::Text(_) => text.green(),
        Value::Function(_) | Value::Builtin(_) | Value::Foreign(_) => text.cyan(),
        _ => text.normal(),
    }
}

fn print_bindings(session: &ReplSession<'_>) {
    let bindings = session.list_bindings();
    if bindings.is_empty() {
        println!("{}", "  (no bindings)".bright_black());
        return;
    }
    for (name, value) in &bindings {
        let shown = session.show(value).unwrap_or_else(|e| e.summary());
        println!("  {} = {}", name.cyan(), colorize(value, shown));
    }
}

fn print_help() {
    println!();
    println!("  {}", "Debugger Commands:".cyan().bold());
    println!("    {}    List visible bindings", ":list".yellow());
    println!("    {}    Resume with the last result", ":exit".yellow());
    println!("    {}    Show this help", ":help".yellow());
    println!();
    println!("  Anything else is evaluated at the halt point.");
    println!("  The last successful result becomes the value of breakpoint().");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_halts_reenter_the_terminal() {
        let debugger = TerminalDebugger::new();
        let _outer = debugger.hold_terminal();
        assert!(debugger.terminal.try_lock().is_some());

        std::thread::scope(|scope| {
            let other = scope.spawn(|| debugger.terminal.try_lock().is_none());
            assert!(other.join().unwrap());
        });
    }
}
