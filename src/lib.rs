// Tala Execution Core
// A small expression language with halt-point debugger sessions and a
// bridge for calling embedded guest-language code

pub mod ast;
pub mod builtins;
pub mod config;
pub mod debugger;
pub mod error;
pub mod instrument;
pub mod lexer;
pub mod parser;
pub mod polyglot;
pub mod vm;

pub use config::Options;
pub use debugger::{DebugServer, ReplSession, SessionManager};
pub use error::{ErrorKind, TalaError, TalaResult};
pub use polyglot::{ForeignError, GuestEngine, Language, PolyglotContext};
pub use vm::value::{Stateful, Value};
pub use vm::{Interpreter, InterpreterBuilder, Program};
