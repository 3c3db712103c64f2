// Type and conversion built-ins
// Provides: len, str, type_of

use super::check_arity;
use crate::vm::value::Value;

pub fn len(args: &[Value], _state: &mut Value) -> Result<Value, String> {
    check_arity(1, args.len())?;
    match &args[0] {
        Value::Text(s) => Ok(Value::Integer(s.chars().count() as i64)),
        Value::Array(items) => Ok(Value::Integer(items.len() as i64)),
        other => Err(format!("len() expects Text or Array, got {}", other.type_name())),
    }
}

pub fn str(args: &[Value], _state: &mut Value) -> Result<Value, String> {
    check_arity(1, args.len())?;
    match &args[0] {
        text @ Value::Text(_) => Ok(text.clone()),
        other => Ok(Value::text(&other.to_string())),
    }
}

pub fn type_of(args: &[Value], _state: &mut Value) -> Result<Value, String> {
    check_arity(1, args.len())?;
    Ok(Value::text(args[0].type_name()))
}
