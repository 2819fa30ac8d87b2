//! Assignment and auto-conversion rules.
//!
//! Conversion policy:
//!
//! - Exact match, anything -> `object`, and derived -> base class are plain
//!   assignments (no conversion).
//! - Numeric values convert between all numeric types. Float -> int
//!   truncates toward zero; a value outside the target's range (or NaN)
//!   has no conversion.
//! - Bool -> integer (true=1, false=0).
//! - Any value -> `string` through its display form.
//! - Otherwise a converter registered on the [`TypeRegistry`] for the exact
//!   `(from, to)` pair is used.
//!
//! [`auto_convert`] never fails: when no rule applies the value passes through
//! unchanged and the downstream assignment reports the type fault with both
//! types named.

use crate::reflect::TypeRegistry;
use crate::types::TypeName;
use crate::value::Value;

/// How a source type relates to a destination type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Values can be assigned as-is.
    Assignable,
    /// Values need [`auto_convert`] first (or an adapter node in the graph).
    Convertible,
    Incompatible,
}

/// Returns `true` if a value of static type `from` can be stored in a `to` slot
/// without conversion.
pub fn is_assignable(from: &TypeName, to: &TypeName, registry: &TypeRegistry) -> bool {
    from == to || *to == TypeName::OBJECT || registry.is_subtype(from, to)
}

/// Returns `true` if [`auto_convert`] bridges `from` to `to`.
pub fn can_convert(from: &TypeName, to: &TypeName, registry: &TypeRegistry) -> bool {
    if is_assignable(from, to, registry) {
        return true;
    }
    // Numeric conversions, including bool -> integer.
    if to.is_numeric() && (from.is_numeric() || (*from == TypeName::BOOL && to.is_integer())) {
        return true;
    }
    if *to == TypeName::STRING {
        return true;
    }
    // A declared object-typed source may hold anything at runtime.
    if *from == TypeName::OBJECT {
        return true;
    }
    registry.converter(from, to).is_some()
}

/// Classifies the relationship between two static types.
pub fn compatibility(from: &TypeName, to: &TypeName, registry: &TypeRegistry) -> Compatibility {
    if is_assignable(from, to, registry) {
        Compatibility::Assignable
    } else if can_convert(from, to, registry) {
        Compatibility::Convertible
    } else {
        Compatibility::Incompatible
    }
}

/// Returns `true` if `value` may be stored in a slot of type `to` as-is.
///
/// `null` conforms to reference types and to `object`.
pub fn value_conforms(value: &Value, to: &TypeName, registry: &TypeRegistry) -> bool {
    if value.is_null() {
        return *to == TypeName::OBJECT || registry.is_reference_type(to);
    }
    is_assignable(&value.type_name(), to, registry)
}

/// Converts `value` toward `to` when a rule applies; otherwise returns it unchanged.
pub fn auto_convert(value: Value, to: &TypeName, registry: &TypeRegistry) -> Value {
    if value.is_null() || value_conforms(&value, to, registry) {
        return value;
    }
    if let Some(converted) = convert_numeric(&value, to) {
        return converted;
    }
    if *to == TypeName::STRING {
        return Value::String(value.to_string());
    }
    let from = value.type_name();
    if let Some(converter) = registry.converter(&from, to) {
        if let Some(converted) = converter(&value) {
            return converted;
        }
    }
    value
}

fn convert_numeric(value: &Value, to: &TypeName) -> Option<Value> {
    let value = match value {
        Value::Bool(b) if to.is_integer() => Value::I64(i64::from(*b)),
        Value::Bool(_) => return None,
        other => other.clone(),
    };
    match to.as_str() {
        "i32" => match value {
            Value::I32(v) => Some(Value::I32(v)),
            Value::I64(v) => i32::try_from(v).ok().map(Value::I32),
            Value::F32(v) => float_to_int(f64::from(v), I32_MIN, I32_END).map(|v| Value::I32(v as i32)),
            Value::F64(v) => float_to_int(v, I32_MIN, I32_END).map(|v| Value::I32(v as i32)),
            _ => None,
        },
        "i64" => match value {
            Value::I32(v) => Some(Value::I64(i64::from(v))),
            Value::I64(v) => Some(Value::I64(v)),
            Value::F32(v) => float_to_int(f64::from(v), I64_MIN, I64_END).map(|v| Value::I64(v as i64)),
            Value::F64(v) => float_to_int(v, I64_MIN, I64_END).map(|v| Value::I64(v as i64)),
            _ => None,
        },
        "f32" => value.as_f64().and_then(|v| {
            let narrowed = v as f32;
            (narrowed.is_finite() || !v.is_finite()).then_some(Value::F32(narrowed))
        }),
        "f64" => value.as_f64().map(Value::F64),
        _ => None,
    }
}

// Half-open float ranges `[MIN, END)` of the integer types.
const I32_MIN: f64 = -2_147_483_648.0;
const I32_END: f64 = 2_147_483_648.0;
const I64_MIN: f64 = -9_223_372_036_854_775_808.0;
const I64_END: f64 = 9_223_372_036_854_775_808.0;

/// Truncates `v` toward zero if the result lies in `[min, end)`. NaN and
/// infinities never do.
fn float_to_int(v: f64, min: f64, end: f64) -> Option<f64> {
    let t = v.trunc();
    (t >= min && t < end).then_some(t)
}
