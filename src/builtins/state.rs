// Interpreter-state built-ins
// Provides: get_state, put_state

use super::check_arity;
use crate::vm::value::Value;

pub fn get_state(args: &[Value], state: &mut Value) -> Result<Value, String> {
    check_arity(0, args.len())?;
    Ok(state.clone())
}

/// Replace the state token, returning the previous one
pub fn put_state(args: &[Value], state: &mut Value) -> Result<Value, String> {
    check_arity(1, args.len())?;
    Ok(std::mem::replace(state, args[0].clone()))
}
