//! Operator semantics (spec.md §4.2 "Expression semantics").

use crate::ast::{BinaryOp, LogicalOp, UnaryOp};
use crate::error::{EvalError, RuntimeError};
use crate::value::Value;

pub fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    match op {
        Add => add(left, right),
        Sub => numeric(left, right, "-", |a, b| Ok(a - b)),
        Mul => numeric(left, right, "*", |a, b| Ok(a * b)),
        Div => numeric(left, right, "/", |a, b| {
            if b == 0.0 {
                Err(EvalError::DivisionByZero.into())
            } else {
                Ok(a / b)
            }
        }),
        Mod => numeric(left, right, "%", |a, b| {
            if b == 0.0 {
                Err(EvalError::DivisionByZero.into())
            } else {
                Ok(a % b)
            }
        }),
        Lt => compare(left, right, |a, b| a < b),
        Lte => compare(left, right, |a, b| a <= b),
        Gt => compare(left, right, |a, b| a > b),
        Gte => compare(left, right, |a, b| a >= b),
        Eq => Ok(Value::Bool(left.equals(&right))),
        NotEq => Ok(Value::Bool(!left.equals(&right))),
    }
}

/// `+` is overloaded: string-coerce-and-concatenate when either side is a
/// string, numeric addition otherwise.
fn add(left: Value, right: Value) -> Result<Value, RuntimeError> {
    match (&left, &right) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", left.string(), right.string())))
        }
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        _ => Err(EvalError::TypeMismatch {
            expected: "number or string".to_string(),
            actual: format!("{} + {}", left.type_name(), right.type_name()),
        }
        .into()),
    }
}

fn numeric(
    left: Value,
    right: Value,
    symbol: &str,
    apply: impl Fn(f64, f64) -> Result<f64, RuntimeError>,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => apply(a, b).map(Value::Number),
        (left, right) => Err(EvalError::TypeMismatch {
            expected: "number".to_string(),
            actual: format!("{} {symbol} {}", left.type_name(), right.type_name()),
        }
        .into()),
    }
}

fn compare(left: Value, right: Value, apply: impl Fn(f64, f64) -> bool) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(apply(a, b))),
        (left, right) => Err(EvalError::TypeMismatch {
            expected: "number".to_string(),
            actual: format!("{} vs {}", left.type_name(), right.type_name()),
        }
        .into()),
    }
}

/// `&&`/`||` short-circuit on `IsTruthy` and yield whichever operand value
/// decided the result, rather than coercing to `Bool`.
pub fn eval_logical_short_circuit(op: LogicalOp, left: &Value) -> Option<Value> {
    match op {
        LogicalOp::And if !left.is_truthy() => Some(left.clone()),
        LogicalOp::Or if left.is_truthy() => Some(left.clone()),
        _ => None,
    }
}

pub fn eval_unary(op: UnaryOp, operand: Value) -> Result<Value, RuntimeError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(EvalError::TypeMismatch {
                expected: "number".to_string(),
                actual: other.type_name().to_string(),
            }
            .into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_concatenates_when_either_side_is_a_string() {
        let result = eval_binary(
            BinaryOp::Add,
            Value::String("x = ".to_string()),
            Value::Number(14.0),
        )
        .unwrap();
        assert_eq!(result.string(), "x = 14");
    }

    #[test]
    fn plus_adds_two_numbers() {
        let result = eval_binary(BinaryOp::Add, Value::Number(2.0), Value::Number(3.0)).unwrap();
        assert_eq!(result, Value::Number(5.0));
    }

    #[test]
    fn division_by_zero_fails() {
        let err = eval_binary(BinaryOp::Div, Value::Number(1.0), Value::Number(0.0)).unwrap_err();
        assert!(matches!(err, RuntimeError::Eval(EvalError::DivisionByZero)));
    }

    #[test]
    fn cross_type_equality_is_false_except_null_equals_null() {
        assert!(eval_binary(BinaryOp::Eq, Value::Null, Value::Null).unwrap().is_truthy());
        assert!(
            !eval_binary(BinaryOp::Eq, Value::Number(0.0), Value::String(String::new()))
                .unwrap()
                .is_truthy()
        );
    }

    #[test]
    fn comparison_requires_numbers() {
        let err = eval_binary(
            BinaryOp::Lt,
            Value::String("a".to_string()),
            Value::Number(1.0),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Eval(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn logical_and_short_circuits_on_falsy_left_returning_left() {
        let left = Value::Null;
        assert_eq!(
            eval_logical_short_circuit(LogicalOp::And, &left),
            Some(Value::Null)
        );
    }

    #[test]
    fn logical_or_short_circuits_on_truthy_left_returning_left() {
        let left = Value::Number(1.0);
        assert_eq!(
            eval_logical_short_circuit(LogicalOp::Or, &left),
            Some(Value::Number(1.0))
        );
    }

    #[test]
    fn unary_not_negates_truthiness() {
        assert_eq!(eval_unary(UnaryOp::Not, Value::Number(0.0)).unwrap(), Value::Bool(true));
    }
}
