//! Operator evaluation.
//!
//! Arithmetic uses checked integer math and promotes mixed operands: any
//! float makes the operation `f64` (`f32` when both sides are `f32`), any
//! `i64` makes an integer operation `i64`. `Add` with a string on either
//! side concatenates display forms. Equality works on every value pair;
//! ordering needs two numbers or two strings; `And`/`Or` need two bools.

use std::cmp::Ordering;

use flowgraph_core::{OperatorKind, TypeName, Value};

/// Why an operator could not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub enum OpFault {
    TypeMismatch { expected: TypeName, got: TypeName },
    DivideByZero,
    Overflow,
}

pub fn eval_operator(op: OperatorKind, a: &Value, b: &Value) -> Result<Value, OpFault> {
    match op {
        OperatorKind::Add => {
            if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
                return Ok(Value::String(format!("{a}{b}")));
            }
            arith(a, b, i32::checked_add, i64::checked_add, |x, y| x + y)
        }
        OperatorKind::Subtract => arith(a, b, i32::checked_sub, i64::checked_sub, |x, y| x - y),
        OperatorKind::Multiply => arith(a, b, i32::checked_mul, i64::checked_mul, |x, y| x * y),
        OperatorKind::Divide => {
            if is_zero_int(b) {
                return Err(OpFault::DivideByZero);
            }
            arith(a, b, i32::checked_div, i64::checked_div, |x, y| x / y)
        }
        OperatorKind::Modulo => {
            if is_zero_int(b) {
                return Err(OpFault::DivideByZero);
            }
            arith(a, b, i32::checked_rem, i64::checked_rem, |x, y| x % y)
        }
        OperatorKind::Equal => Ok(Value::Bool(loose_eq(a, b))),
        OperatorKind::NotEqual => Ok(Value::Bool(!loose_eq(a, b))),
        OperatorKind::Less => compare(a, b).map(|o| Value::Bool(o == Ordering::Less)),
        OperatorKind::LessOrEqual => compare(a, b).map(|o| Value::Bool(o != Ordering::Greater)),
        OperatorKind::Greater => compare(a, b).map(|o| Value::Bool(o == Ordering::Greater)),
        OperatorKind::GreaterOrEqual => compare(a, b).map(|o| Value::Bool(o != Ordering::Less)),
        OperatorKind::And => Ok(Value::Bool(bool_operand(a)? && bool_operand(b)?)),
        OperatorKind::Or => Ok(Value::Bool(bool_operand(a)? || bool_operand(b)?)),
    }
}

fn is_zero_int(v: &Value) -> bool {
    v.as_i64() == Some(0)
}

fn numeric_fault(a: &Value, b: &Value) -> OpFault {
    let got = if a.as_f64().is_none() { a.type_name() } else { b.type_name() };
    OpFault::TypeMismatch {
        expected: TypeName::F64,
        got,
    }
}

fn arith(
    a: &Value,
    b: &Value,
    int32: fn(i32, i32) -> Option<i32>,
    int64: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result<Value, OpFault> {
    match (a, b) {
        (Value::I32(x), Value::I32(y)) => int32(*x, *y).map(Value::I32).ok_or(OpFault::Overflow),
        (Value::F32(x), Value::F32(y)) => Ok(Value::F32(float(f64::from(*x), f64::from(*y)) as f32)),
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => int64(x, y).map(Value::I64).ok_or(OpFault::Overflow),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::F64(float(x, y))),
                _ => Err(numeric_fault(a, b)),
            },
        },
    }
}

/// Equality with numeric values compared by magnitude across types.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, OpFault> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Ok(x.cmp(&y));
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).ok_or(OpFault::TypeMismatch {
            expected: TypeName::F64,
            got: TypeName::F64,
        }),
        _ => Err(numeric_fault(a, b)),
    }
}

fn bool_operand(v: &Value) -> Result<bool, OpFault> {
    v.as_bool().ok_or_else(|| OpFault::TypeMismatch {
        expected: TypeName::BOOL,
        got: v.type_name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_stays_i32() {
        assert_eq!(
            eval_operator(OperatorKind::Add, &Value::I32(2), &Value::I32(3)),
            Ok(Value::I32(5))
        );
        assert_eq!(
            eval_operator(OperatorKind::Modulo, &Value::I32(7), &Value::I32(4)),
            Ok(Value::I32(3))
        );
    }

    #[test]
    fn mixed_operands_promote() {
        assert_eq!(
            eval_operator(OperatorKind::Multiply, &Value::I32(2), &Value::I64(4)),
            Ok(Value::I64(8))
        );
        assert_eq!(
            eval_operator(OperatorKind::Add, &Value::I32(1), &Value::F64(0.5)),
            Ok(Value::F64(1.5))
        );
        assert_eq!(
            eval_operator(OperatorKind::Subtract, &Value::F32(1.5), &Value::F32(0.5)),
            Ok(Value::F32(1.0))
        );
    }

    #[test]
    fn overflow_and_zero_division_fault() {
        assert_eq!(
            eval_operator(OperatorKind::Add, &Value::I32(i32::MAX), &Value::I32(1)),
            Err(OpFault::Overflow)
        );
        assert_eq!(
            eval_operator(OperatorKind::Divide, &Value::I32(1), &Value::I32(0)),
            Err(OpFault::DivideByZero)
        );
        assert!(matches!(
            eval_operator(OperatorKind::Divide, &Value::F64(1.0), &Value::F64(0.0)),
            Ok(Value::F64(v)) if v.is_infinite()
        ));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            eval_operator(OperatorKind::Add, &Value::from("hp: "), &Value::I32(3)),
            Ok(Value::from("hp: 3"))
        );
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            eval_operator(OperatorKind::Less, &Value::I32(1), &Value::F64(1.5)),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            eval_operator(OperatorKind::Equal, &Value::I32(2), &Value::I64(2)),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            eval_operator(OperatorKind::GreaterOrEqual, &Value::from("b"), &Value::from("a")),
            Ok(Value::Bool(true))
        );
        assert!(matches!(
            eval_operator(OperatorKind::Less, &Value::Bool(true), &Value::I32(1)),
            Err(OpFault::TypeMismatch { .. })
        ));
    }

    #[test]
    fn logic_needs_bools() {
        assert_eq!(
            eval_operator(OperatorKind::And, &Value::Bool(true), &Value::Bool(false)),
            Ok(Value::Bool(false))
        );
        assert_eq!(
            eval_operator(OperatorKind::Or, &Value::I32(1), &Value::Bool(true)),
            Err(OpFault::TypeMismatch {
                expected: TypeName::BOOL,
                got: TypeName::I32
            })
        );
    }

    proptest::proptest! {
        #[test]
        fn i32_arithmetic_matches_checked_math(x: i32, y: i32) {
            let add = eval_operator(OperatorKind::Add, &Value::I32(x), &Value::I32(y));
            proptest::prop_assert_eq!(add, x.checked_add(y).map(Value::I32).ok_or(OpFault::Overflow));
            let mul = eval_operator(OperatorKind::Multiply, &Value::I32(x), &Value::I32(y));
            proptest::prop_assert_eq!(mul, x.checked_mul(y).map(Value::I32).ok_or(OpFault::Overflow));
        }

        #[test]
        fn ordering_is_consistent_across_widths(x: i32, y: i64) {
            let less = eval_operator(OperatorKind::Less, &Value::I32(x), &Value::I64(y));
            let greater_eq = eval_operator(OperatorKind::GreaterOrEqual, &Value::I32(x), &Value::I64(y));
            proptest::prop_assert_eq!(less, Ok(Value::Bool(i64::from(x) < y)));
            proptest::prop_assert_eq!(greater_eq, Ok(Value::Bool(i64::from(x) >= y)));
        }
    }
}
