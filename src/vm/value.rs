use crate::ast::{Ast, NodeId};
use crate::builtins::Builtin;
use crate::polyglot::{CallSite, PolyglotObject};
use crate::vm::scope::{Frame, LocalScope};
use std::fmt;
use std::sync::Arc;

/// A host value. Every variant is `Send + Sync` so halted frames and
/// compiled call sites can be shared between host threads.
#[derive(Clone)]
pub enum Value {
    Nothing,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(Arc<str>),
    Array(Arc<Vec<Value>>),
    Function(Arc<Closure>),
    Builtin(Builtin),
    /// A function backed by embedded guest-language source
    Foreign(Arc<CallSite>),
    /// A guest object rewrapped for use on the host side
    Polyglot(PolyglotObject),
}

impl Value {
    pub fn text(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "Nothing",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::Array(_) => "Array",
            Value::Function(_) => "Function",
            Value::Builtin(_) => "Builtin",
            Value::Foreign(_) => "ForeignFunction",
            Value::Polyglot(_) => "Polyglot",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nothing => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Strict identity: same variant, same payload, and the same allocation
    /// for reference-like values. `PartialEq` is the language's `==` and
    /// treats `1 == 1.0` as true; this does not.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Foreign(a), Value::Foreign(b)) => Arc::ptr_eq(a, b),
            (Value::Polyglot(a), Value::Polyglot(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => self.identical(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "Nothing"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "{}", s),
            Value::Array(items) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|v| match v {
                        Value::Text(s) => format!("'{}'", s),
                        other => other.to_string(),
                    })
                    .collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Function(func) => write!(f, "<fn {}>", func.name),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name()),
            Value::Foreign(site) => write!(f, "<foreign {}>", site.source().language()),
            Value::Polyglot(obj) => write!(f, "<{} object>", obj.language()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

/// A host function value: code plus the frame it closed over
pub struct Closure {
    pub name: String,
    pub arity: usize,
    pub body: NodeId,
    pub ast: Arc<Ast>,
    pub scope: Arc<LocalScope>,
    pub captured: Arc<Frame>,
}

/// A value paired with the interpreter-state token it was produced under
#[derive(Clone, Debug)]
pub struct Stateful {
    pub state: Value,
    pub value: Value,
}

impl Stateful {
    pub fn new(state: Value, value: Value) -> Self {
        Self { state, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_crosses_representations() {
        assert_eq!(Value::Integer(2), Value::Number(2.0));
        assert!(!Value::Integer(2).identical(&Value::Number(2.0)));
    }

    #[test]
    fn identical_arrays_share_an_allocation() {
        let a = Value::array(vec![Value::Integer(1)]);
        let b = Value::array(vec![Value::Integer(1)]);
        assert_eq!(a, b);
        assert!(!a.identical(&b));
        assert!(a.identical(&a.clone()));
    }

    #[test]
    fn display_matches_repl_output() {
        assert_eq!(Value::Number(4.0).to_string(), "4");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(
            Value::array(vec![Value::text("a"), Value::Integer(1)]).to_string(),
            "['a', 1]"
        );
    }
}
