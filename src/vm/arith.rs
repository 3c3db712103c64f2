// Arithmetic and comparison
//
// Each operator tries its cases in order: exact integer math, integer math
// promoted to floating point on overflow, floating point, then the
// operator-specific fallbacks (text concatenation for `+`). Anything left is
// a type error.

use crate::ast::{BinaryOp, UnaryOp};
use crate::vm::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ArithError {
    Type(String),
    DivisionByZero,
}

type ArithResult = Result<Value, ArithError>;

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> ArithResult {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => numeric(op, left, right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => numeric(op, left, right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => divide(left, right),
        BinaryOp::Mod => modulo(left, right),
        BinaryOp::Equal => Ok(Value::Boolean(left == right)),
        BinaryOp::NotEqual => Ok(Value::Boolean(left != right)),
        BinaryOp::Less => compare(op, left, right, Ordering::is_lt),
        BinaryOp::LessEqual => compare(op, left, right, Ordering::is_le),
        BinaryOp::Greater => compare(op, left, right, Ordering::is_gt),
        BinaryOp::GreaterEqual => compare(op, left, right, Ordering::is_ge),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> ArithResult {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
        (UnaryOp::Negate, Value::Integer(n)) => Ok(n
            .checked_neg()
            .map(Value::Integer)
            .unwrap_or(Value::Number(-(*n as f64)))),
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Negate, other) => Err(ArithError::Type(format!(
            "Cannot negate {}",
            other.type_name()
        ))),
    }
}

fn add(left: &Value, right: &Value) -> ArithResult {
    if let (Value::Text(a), Value::Text(b)) = (left, right) {
        let mut joined = String::with_capacity(a.len() + b.len());
        joined.push_str(a);
        joined.push_str(b);
        return Ok(Value::Text(Arc::from(joined)));
    }
    if let (Value::Text(a), other) = (left, right) {
        if !matches!(other, Value::Array(_)) {
            return Ok(Value::Text(Arc::from(format!("{}{}", a, other))));
        }
    }
    numeric(BinaryOp::Add, left, right, i64::checked_add, |a, b| a + b)
}

fn numeric(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    exact: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> ArithResult {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(exact(*a, *b)
            .map(Value::Integer)
            .unwrap_or_else(|| Value::Number(float(*a as f64, *b as f64)))),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => Ok(Value::Number(float(a, b))),
            _ => Err(mismatch(op, left, right)),
        },
    }
}

fn divide(left: &Value, right: &Value) -> ArithResult {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) => Err(ArithError::DivisionByZero),
        (Value::Integer(a), Value::Integer(b)) if a.checked_rem(*b) == Some(0) => {
            Ok(a.checked_div(*b)
                .map(Value::Integer)
                .unwrap_or(Value::Number(*a as f64 / *b as f64)))
        }
        _ => match (left.as_number(), right.as_number()) {
            (Some(_), Some(b)) if b == 0.0 => Err(ArithError::DivisionByZero),
            (Some(a), Some(b)) => Ok(Value::Number(a / b)),
            _ => Err(mismatch(BinaryOp::Div, left, right)),
        },
    }
}

fn modulo(left: &Value, right: &Value) -> ArithResult {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) => Err(ArithError::DivisionByZero),
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_rem(*b))),
        _ => match (left.as_number(), right.as_number()) {
            (Some(_), Some(b)) if b == 0.0 => Err(ArithError::DivisionByZero),
            (Some(a), Some(b)) => Ok(Value::Number(a % b)),
            _ => Err(mismatch(BinaryOp::Mod, left, right)),
        },
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value, test: fn(Ordering) -> bool) -> ArithResult {
    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => return Err(mismatch(op, left, right)),
        },
    };
    // NaN compares false under every operator
    Ok(Value::Boolean(ordering.map(test).unwrap_or(false)))
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> ArithError {
    ArithError::Type(format!(
        "Unsupported operand types for '{}': {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_overflow_promotes_to_number() {
        let result = binary(BinaryOp::Add, &Value::Integer(i64::MAX), &Value::Integer(1)).unwrap();
        assert!(matches!(result, Value::Number(_)));
        let result = binary(BinaryOp::Mul, &Value::Integer(6), &Value::Integer(7)).unwrap();
        assert!(matches!(result, Value::Integer(42)));
    }

    #[test]
    fn division_stays_integral_only_when_exact() {
        assert!(matches!(
            binary(BinaryOp::Div, &Value::Integer(6), &Value::Integer(3)).unwrap(),
            Value::Integer(2)
        ));
        assert_eq!(
            binary(BinaryOp::Div, &Value::Integer(7), &Value::Integer(2)).unwrap(),
            Value::Number(3.5)
        );
        assert_eq!(
            binary(BinaryOp::Div, &Value::Integer(1), &Value::Integer(0)),
            Err(ArithError::DivisionByZero)
        );
        assert_eq!(
            binary(BinaryOp::Mod, &Value::Number(1.0), &Value::Integer(0)),
            Err(ArithError::DivisionByZero)
        );
    }

    #[test]
    fn plus_concatenates_text() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::text("n="), &Value::Integer(3)).unwrap(),
            Value::text("n=3")
        );
    }

    #[test]
    fn mixed_operands_are_type_errors() {
        let err = binary(BinaryOp::Sub, &Value::text("a"), &Value::Integer(1)).unwrap_err();
        assert_eq!(
            err,
            ArithError::Type("Unsupported operand types for '-': Text and Integer".into())
        );
    }

    #[test]
    fn comparisons_cross_numeric_types() {
        assert_eq!(
            binary(BinaryOp::Less, &Value::Integer(1), &Value::Number(1.5)).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            binary(BinaryOp::GreaterEqual, &Value::Number(f64::NAN), &Value::Integer(0)).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn negating_min_integer_promotes() {
        assert!(matches!(
            unary(UnaryOp::Negate, &Value::Integer(i64::MIN)).unwrap(),
            Value::Number(_)
        ));
    }
}
