// Tala Built-in Module
// Global functions resolved by name when no local binding matches

mod console;
mod state;
mod types;

use crate::vm::value::Value;
use std::fmt;

/// Signature shared by every builtin. `state` is the interpreter-state token
/// threaded through the current evaluation.
pub type NativeFn = fn(&[Value], &mut Value) -> Result<Value, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Len,
    Str,
    TypeOf,
    GetState,
    PutState,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Print,
        Builtin::Len,
        Builtin::Str,
        Builtin::TypeOf,
        Builtin::GetState,
        Builtin::PutState,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::TypeOf => "type_of",
            Builtin::GetState => "get_state",
            Builtin::PutState => "put_state",
        }
    }

    fn native(&self) -> NativeFn {
        match self {
            Builtin::Print => console::print,
            Builtin::Len => types::len,
            Builtin::Str => types::str,
            Builtin::TypeOf => types::type_of,
            Builtin::GetState => state::get_state,
            Builtin::PutState => state::put_state,
        }
    }

    pub fn call(&self, args: &[Value], state: &mut Value) -> Result<Value, String> {
        (self.native())(args, state)
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Helper: check exact arity
pub fn check_arity(expected: usize, got: usize) -> Result<(), String> {
    if expected != got {
        Err(format!(
            "Expected {} argument{} but got {}",
            expected,
            if expected == 1 { "" } else { "s" },
            got
        ))
    } else {
        Ok(())
    }
}
