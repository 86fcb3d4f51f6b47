//! Arithmetic, bitwise, and comparison operator semantics (spec §4.4
//! "Operator semantics").

use crate::error::PanicReason;
use crate::value::{compare, Value};

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn type_mismatch(expected: &'static str, actual: &Value) -> PanicReason {
    PanicReason::TypeMismatch { expected, actual: actual.ty() }
}

/// `ADD`/`SUB`/`MUL`: int op int stays int; any float operand promotes the
/// result to float.
pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    numeric_op(lhs, rhs, |a, b| a.wrapping_add(b), |a, b| a + b)
}

pub fn sub(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    numeric_op(lhs, rhs, |a, b| a.wrapping_sub(b), |a, b| a - b)
}

pub fn mul(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    numeric_op(lhs, rhs, |a, b| a.wrapping_mul(b), |a, b| a * b)
}

fn numeric_op(lhs: &Value, rhs: &Value, int_op: impl Fn(i64, i64) -> i64, float_op: impl Fn(f64, f64) -> f64) -> Result<Value, PanicReason> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::int(int_op(*a, *b))),
        _ => {
            let a = as_number(lhs).ok_or_else(|| type_mismatch("int or float", lhs))?;
            let b = as_number(rhs).ok_or_else(|| type_mismatch("int or float", rhs))?;
            Ok(Value::float(float_op(a, b)))
        }
    }
}

/// Resolves spec §9's open question on `DIV` semantics: whether `/` always
/// promotes int operands to float, or only when the division isn't exact.
/// No available source settles this (the disassembler listed in
/// `original_source` covers encoding, not execution semantics), so rather
/// than guess, both readings are implemented and selected by this flag —
/// per the spec's own instruction not to guess here. `AlwaysFloat` is the
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DivMode {
    #[default]
    AlwaysFloat,
    IntWhenExact,
}

/// `DIV`: promotes to float under `DivMode::AlwaysFloat`; under
/// `DivMode::IntWhenExact`, two integer operands whose division is exact
/// stay integer and only a non-exact division promotes to float.
pub fn div(lhs: &Value, rhs: &Value, mode: DivMode) -> Result<Value, PanicReason> {
    if mode == DivMode::IntWhenExact {
        if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
            if *b == 0 {
                return Err(PanicReason::DivisionByZero);
            }
            if a.wrapping_rem(*b) == 0 {
                return Ok(Value::int(a.wrapping_div(*b)));
            }
        }
    }
    let a = as_number(lhs).ok_or_else(|| type_mismatch("int or float", lhs))?;
    let b = as_number(rhs).ok_or_else(|| type_mismatch("int or float", rhs))?;
    if b == 0.0 {
        return Err(PanicReason::DivisionByZero);
    }
    Ok(Value::float(a / b))
}

/// `MOD` is defined only on integers; a float operand is a type error.
pub fn modulo(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    let a = as_int(lhs).ok_or_else(|| type_mismatch("int", lhs))?;
    let b = as_int(rhs).ok_or_else(|| type_mismatch("int", rhs))?;
    if b == 0 {
        return Err(PanicReason::DivisionByZero);
    }
    Ok(Value::int(a.wrapping_rem(b)))
}

pub fn neg(v: &Value) -> Result<Value, PanicReason> {
    match v {
        Value::Int(i) => Ok(Value::int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::float(-f)),
        _ => Err(type_mismatch("int or float", v)),
    }
}

pub fn inc(v: &Value) -> Result<Value, PanicReason> {
    as_int(v).map(|i| Value::int(i.wrapping_add(1))).ok_or_else(|| type_mismatch("int", v))
}

pub fn dec(v: &Value) -> Result<Value, PanicReason> {
    as_int(v).map(|i| Value::int(i.wrapping_sub(1))).ok_or_else(|| type_mismatch("int", v))
}

fn as_bitwise_int(v: &Value) -> Result<i64, PanicReason> {
    as_int(v).ok_or_else(|| PanicReason::NotAnInteger(v.ty()))
}

pub fn bitand(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    Ok(Value::int(as_bitwise_int(lhs)? & as_bitwise_int(rhs)?))
}

pub fn bitor(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    Ok(Value::int(as_bitwise_int(lhs)? | as_bitwise_int(rhs)?))
}

pub fn bitxor(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    Ok(Value::int(as_bitwise_int(lhs)? ^ as_bitwise_int(rhs)?))
}

pub fn shl(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    let a = as_bitwise_int(lhs)?;
    let b = as_bitwise_int(rhs)?;
    Ok(Value::int(a.wrapping_shl(b as u32)))
}

pub fn shr(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    let a = as_bitwise_int(lhs)?;
    let b = as_bitwise_int(rhs)?;
    Ok(Value::int(a.wrapping_shr(b as u32)))
}

pub fn bitnot(v: &Value) -> Result<Value, PanicReason> {
    as_bitwise_int(v).map(|i| Value::int(!i))
}

pub fn lognot(v: &Value) -> Value {
    Value::bool(!v.truthy())
}

pub fn sizeof(v: &Value) -> Result<Value, PanicReason> {
    match v {
        Value::Object(o) => o.size_of().map(Value::int).ok_or_else(|| type_mismatch("string, array, hashmap, or function", v)),
        _ => Err(type_mismatch("string, array, hashmap, or function", v)),
    }
}

pub fn typeof_name(v: &Value) -> Value {
    Value::string(v.ty().name())
}

/// `EQ`/`NE`: defined for every pair, never a runtime error.
pub fn eq(lhs: &Value, rhs: &Value) -> Value {
    Value::bool(lhs == rhs)
}

pub fn ne(lhs: &Value, rhs: &Value) -> Value {
    Value::bool(lhs != rhs)
}

fn ordered(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering, PanicReason> {
    compare(lhs, rhs).ok_or_else(|| PanicReason::NotComparable { lhs: lhs.ty(), rhs: rhs.ty() })
}

pub fn lt(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    Ok(Value::bool(ordered(lhs, rhs)?.is_lt()))
}

pub fn le(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    Ok(Value::bool(ordered(lhs, rhs)?.is_le()))
}

pub fn gt(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    Ok(Value::bool(ordered(lhs, rhs)?.is_gt()))
}

pub fn ge(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    Ok(Value::bool(ordered(lhs, rhs)?.is_ge()))
}

/// `CONCAT` requires both operands to be strings.
pub fn concat(lhs: &Value, rhs: &Value) -> Result<Value, PanicReason> {
    let a = lhs.as_str().ok_or_else(|| type_mismatch("string", lhs))?;
    let b = rhs.as_str().ok_or_else(|| type_mismatch("string", rhs))?;
    Ok(Value::string(format!("{a}{b}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_add_stays_int() {
        assert_eq!(add(&Value::int(2), &Value::int(3)).unwrap(), Value::int(5));
    }

    #[test]
    fn mixed_add_promotes_to_float() {
        assert_eq!(add(&Value::int(2), &Value::float(0.5)).unwrap(), Value::float(2.5));
    }

    #[test]
    fn div_always_promotes_even_for_two_ints() {
        assert_eq!(div(&Value::int(4), &Value::int(2), DivMode::AlwaysFloat).unwrap(), Value::float(2.0));
    }

    #[test]
    fn div_int_when_exact_stays_int_only_when_exact() {
        assert_eq!(div(&Value::int(4), &Value::int(2), DivMode::IntWhenExact).unwrap(), Value::int(2));
        assert_eq!(div(&Value::int(5), &Value::int(2), DivMode::IntWhenExact).unwrap(), Value::float(2.5));
    }

    #[test]
    fn div_by_zero_is_division_by_zero_under_either_mode() {
        assert!(matches!(div(&Value::int(1), &Value::int(0), DivMode::AlwaysFloat), Err(PanicReason::DivisionByZero)));
        assert!(matches!(div(&Value::int(1), &Value::int(0), DivMode::IntWhenExact), Err(PanicReason::DivisionByZero)));
    }

    #[test]
    fn mod_rejects_float_operands() {
        assert!(matches!(modulo(&Value::float(1.0), &Value::int(2)), Err(PanicReason::TypeMismatch { .. })));
    }

    #[test]
    fn mod_by_zero_is_division_by_zero() {
        assert!(matches!(modulo(&Value::int(1), &Value::int(0)), Err(PanicReason::DivisionByZero)));
    }

    #[test]
    fn comparison_across_incompatible_types_errors() {
        let err = lt(&Value::int(1), &Value::string("x")).unwrap_err();
        assert!(matches!(err, PanicReason::NotComparable { .. }));
    }
}
