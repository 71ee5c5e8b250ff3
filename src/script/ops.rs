/*!
 * Operators
 * Arithmetic, comparison, membership and indexing on plain values
 */

use super::ast::BinaryOp;
use super::error::{ErrorKind, ScriptError, ScriptResult};
use crate::core::limits::MAX_RANGE_LEN;
use crate::protocol::Value;
use std::cmp::Ordering;

/// Numeric view of a value, keeping ints exact
#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn overflow() -> ScriptError {
    ScriptError::value("integer overflow")
}

/// Integral float to `i64`; out-of-range values are an overflow, not a saturation
pub fn float_to_int(f: f64) -> ScriptResult<i64> {
    // 2^63 is exact in f64; i64::MAX is not
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if (-LIMIT..LIMIT).contains(&f) {
        Ok(f as i64)
    } else {
        Err(overflow())
    }
}

fn zero_division(message: &str) -> ScriptError {
    ScriptError::new(ErrorKind::ZeroDivisionError, message)
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(equals(left, right))),
        BinaryOp::NotEq => Ok(Value::Bool(!equals(left, right))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = compare(op, left, right)?;
            let result = match (op, ordering) {
                (_, None) => false,
                (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
                (BinaryOp::LtEq, Some(o)) => o != Ordering::Greater,
                (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::In => contains(right, left).map(Value::Bool),
        BinaryOp::NotIn => contains(right, left).map(|found| Value::Bool(!found)),
        BinaryOp::Add => add(left, right),
        BinaryOp::Mul => multiply(left, right),
        BinaryOp::Sub
        | BinaryOp::Div
        | BinaryOp::FloorDiv
        | BinaryOp::Mod
        | BinaryOp::Pow => {
            let (a, b) = match (num(left), num(right)) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(unsupported(op, left, right)),
            };
            arithmetic(op, a, b)
        }
    }
}

fn add(left: &Value, right: &Value) -> ScriptResult<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Value::Bytes(a), Value::Bytes(b)) => {
            Ok(Value::Bytes(a.iter().chain(b.iter()).copied().collect()))
        }
        _ => match (num(left), num(right)) {
            (Some(a), Some(b)) => arithmetic(BinaryOp::Add, a, b),
            _ => Err(unsupported(BinaryOp::Add, left, right)),
        },
    }
}

fn multiply(left: &Value, right: &Value) -> ScriptResult<Value> {
    let repeat = |count: i64, unit: usize| -> ScriptResult<usize> {
        let count = count.max(0) as usize;
        match count.checked_mul(unit) {
            Some(total) if total <= MAX_RANGE_LEN => Ok(count),
            _ => Err(ScriptError::value("repetition result too large")),
        }
    };
    match (left, right) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            Ok(Value::Str(s.repeat(repeat(*n, s.len())?)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            let count = repeat(*n, items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::List(out))
        }
        _ => match (num(left), num(right)) {
            (Some(a), Some(b)) => arithmetic(BinaryOp::Mul, a, b),
            _ => Err(unsupported(BinaryOp::Mul, left, right)),
        },
    }
}

fn arithmetic(op: BinaryOp, a: Num, b: Num) -> ScriptResult<Value> {
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => int_arithmetic(op, a, b),
        (a, b) => float_arithmetic(op, to_f64(a), to_f64(b)),
    }
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> ScriptResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
        _ => unreachable!("non-arithmetic operator {:?}", op),
    };
    Ok(Value::Int(result))
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> ScriptResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            a - b * (a / b).floor()
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            a.powf(b)
        }
        _ => unreachable!("non-arithmetic operator {:?}", op),
    };
    Ok(Value::Float(result))
}

/// Equality with int/float/bool cross comparison
pub fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && equals(va, vb))
        }
        _ => match (num(left), num(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(a), Some(b)) => to_f64(a) == to_f64(b),
            _ => left == right,
        },
    }
}

/// Ordering; `None` when unordered (NaN)
pub fn compare(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Option<Ordering>> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !equals(x, y) {
                    return compare(op, x, y);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => match (num(left), num(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(Some(a.cmp(&b))),
            (Some(a), Some(b)) => Ok(to_f64(a).partial_cmp(&to_f64(b))),
            _ => Err(ScriptError::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> ScriptResult<bool> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Str(_), other) => Err(ScriptError::type_error(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_name()
        ))),
        (Value::List(items), _) => Ok(items.iter().any(|v| equals(v, item))),
        (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(key)),
        (Value::Map(_), _) => Ok(false),
        (Value::Bytes(bytes), Value::Int(b)) => Ok(u8::try_from(*b)
            .map(|b| bytes.contains(&b))
            .unwrap_or(false)),
        (other, _) => Err(ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn normalize_index(index: i64, len: usize, what: &str) -> ScriptResult<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    if resolved < 0 || resolved >= len {
        return Err(ScriptError::new(
            ErrorKind::IndexError,
            format!("{} index out of range", what),
        ));
    }
    Ok(resolved as usize)
}

/// `container[index]`
pub fn index(container: &Value, key: &Value) -> ScriptResult<Value> {
    match (container, key) {
        (Value::List(items), _) => {
            let i = key.as_int().ok_or_else(|| {
                ScriptError::type_error(format!(
                    "list indices must be integers, not {}",
                    key.type_name()
                ))
            })?;
            Ok(items[normalize_index(i, items.len(), "list")?].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let count = s.chars().count();
            let at = normalize_index(*i, count, "string")?;
            Ok(Value::Str(
                s.chars().nth(at).map(String::from).unwrap_or_default(),
            ))
        }
        (Value::Bytes(bytes), Value::Int(i)) => {
            Ok(Value::Int(i64::from(bytes[normalize_index(*i, bytes.len(), "bytes")?])))
        }
        (Value::Map(map), Value::Str(k)) => map
            .get(k)
            .cloned()
            .ok_or_else(|| ScriptError::new(ErrorKind::KeyError, key.repr())),
        (Value::Map(_), _) => Err(ScriptError::new(ErrorKind::KeyError, key.repr())),
        (other, _) => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn negate(value: &Value) -> ScriptResult<Value> {
    match num(value) {
        Some(Num::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        Some(Num::Float(f)) => Ok(Value::Float(-f)),
        None => Err(ScriptError::type_error(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn op(op: BinaryOp, a: impl Into<Value>, b: impl Into<Value>) -> ScriptResult<Value> {
        binary(op, &a.into(), &b.into())
    }

    #[test]
    fn test_floor_division_and_modulo_follow_sign_of_divisor() {
        assert_eq!(op(BinaryOp::FloorDiv, -7, 2).unwrap(), Value::Int(-4));
        assert_eq!(op(BinaryOp::Mod, -7, 2).unwrap(), Value::Int(1));
        assert_eq!(op(BinaryOp::Mod, 7, -2).unwrap(), Value::Int(-1));
        assert_eq!(op(BinaryOp::FloorDiv, 7.5, 2).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_division_by_zero() {
        for o in [BinaryOp::Div, BinaryOp::FloorDiv, BinaryOp::Mod] {
            let err = op(o, 1, 0).unwrap_err();
            assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
        }
    }

    #[test]
    fn test_overflow_is_error() {
        assert!(op(BinaryOp::Mul, i64::MAX, 2).is_err());
        assert!(op(BinaryOp::Pow, 10, 40).is_err());
        assert_eq!(op(BinaryOp::Pow, 2, -1).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_mixed_equality() {
        assert!(equals(&Value::Int(1), &Value::Float(1.0)));
        assert!(equals(&Value::Bool(true), &Value::Int(1)));
        assert!(!equals(&Value::from("1"), &Value::Int(1)));
    }

    #[test]
    fn test_sequences() {
        assert_eq!(op(BinaryOp::Add, "ab", "cd").unwrap(), Value::from("abcd"));
        assert_eq!(op(BinaryOp::Mul, "ab", 3).unwrap(), Value::from("ababab"));
        assert_eq!(
            op(BinaryOp::In, 2, vec![1, 2, 3]).unwrap(),
            Value::Bool(true)
        );
        assert!(op(BinaryOp::Add, "a", 1).is_err());
        assert!(op(BinaryOp::Lt, "a", 1).is_err());
    }

    #[test]
    fn test_indexing() {
        let list = Value::from(vec![10, 20, 30]);
        assert_eq!(index(&list, &Value::Int(-1)).unwrap(), Value::Int(30));
        assert_eq!(
            index(&list, &Value::Int(3)).unwrap_err().kind,
            ErrorKind::IndexError
        );
        assert_eq!(
            index(&Value::from("héllo"), &Value::Int(1)).unwrap(),
            Value::from("é")
        );
        let map = Value::Map(Default::default());
        assert_eq!(
            index(&map, &Value::from("k")).unwrap_err().kind,
            ErrorKind::KeyError
        );
    }
}
