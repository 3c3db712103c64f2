// Tala Lexer
// Shared by the host front end and the built-in guest script engine

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{Token, TokenKind};
