// Tala VM Module
// Values, lexical scopes, arithmetic and the tree-walking interpreter

pub mod arith;
mod interpreter;
pub mod scope;
pub mod value;

pub(crate) use interpreter::Control;
pub use interpreter::{Interpreter, InterpreterBuilder, Program, REPL_FILE};
