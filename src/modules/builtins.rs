/*!
 * Builtins
 * Functions visible from every namespace without an import
 */

use super::catalog::{NativeModule, BUILTINS};
use crate::core::limits::MAX_RANGE_LEN;
use crate::protocol::Value;
use crate::script::ast::BinaryOp;
use crate::script::ops::{binary, compare, float_to_int};
use crate::script::{Args, ErrorKind, ScriptError, ScriptResult};
use std::cmp::Ordering;

pub(super) fn module() -> NativeModule {
    NativeModule::new(BUILTINS)
        .function("len", |_, args| len(args))
        .function("sum", |_, args| sum(args))
        .function("min", |_, args| extreme(args, "min", Ordering::Less))
        .function("max", |_, args| extreme(args, "max", Ordering::Greater))
        .function("abs", |_, args| abs(args))
        .function("str", |_, args| {
            args.expect_between("str", 0, 1)?;
            Ok(Value::Str(args.get(0).map(|v| v.to_string()).unwrap_or_default()))
        })
        .function("repr", |_, args| {
            args.expect("repr", 1)?;
            Ok(Value::Str(args.value(0)?.repr()))
        })
        .function("int", |_, args| int(args))
        .function("float", |_, args| float(args))
        .function("bool", |_, args| {
            args.expect_between("bool", 0, 1)?;
            Ok(Value::Bool(args.get(0).is_some_and(Value::is_truthy)))
        })
        .function("range", |_, args| range(args))
        .function("sorted", |_, args| sorted(args))
        .function("reversed", |_, args| {
            args.expect("reversed", 1)?;
            let mut items = items_of(args.value(0)?, "reversed")?;
            items.reverse();
            Ok(Value::List(items))
        })
        .function("keys", |_, args| {
            args.expect("keys", 1)?;
            match args.value(0)? {
                Value::Map(map) => Ok(Value::List(
                    map.keys().cloned().map(Value::Str).collect(),
                )),
                other => Err(ScriptError::type_error(format!(
                    "keys() expects a dict, got {}",
                    other.type_name()
                ))),
            }
        })
        .function("fail", |_, args| fail(args))
}

/// Elements of an iterable value
fn items_of(value: &Value, func: &str) -> ScriptResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Bytes(b) => Ok(b.iter().map(|&b| Value::Int(i64::from(b))).collect()),
        Value::Map(map) => Ok(map.keys().cloned().map(Value::Str).collect()),
        other => Err(ScriptError::type_error(format!(
            "{}() argument '{}' object is not iterable",
            func,
            other.type_name()
        ))),
    }
}

fn len(args: Args) -> ScriptResult<Value> {
    args.expect("len", 1)?;
    let n = match args.value(0)? {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(ScriptError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

fn sum(args: Args) -> ScriptResult<Value> {
    args.expect_between("sum", 1, 2)?;
    let start = args.get(1).cloned().unwrap_or(Value::Int(0));
    if matches!(start, Value::Str(_)) {
        return Err(ScriptError::type_error(
            "sum() can't sum strings, use text.join instead",
        ));
    }
    items_of(args.value(0)?, "sum")?
        .iter()
        .try_fold(start, |acc, item| binary(BinaryOp::Add, &acc, item))
}

/// `min`/`max` over one iterable or several arguments
fn extreme(args: Args, func: &str, wanted: Ordering) -> ScriptResult<Value> {
    args.allow_keywords(func, &["default"])?;
    let items = if args.len() == 1 {
        items_of(args.value(0)?, func)?
    } else {
        args.positional.clone()
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return args.keyword("default").cloned().ok_or_else(|| {
            ScriptError::value(format!("{}() arg is an empty sequence", func))
        });
    };
    let op = if wanted == Ordering::Less {
        BinaryOp::Lt
    } else {
        BinaryOp::Gt
    };
    for item in iter {
        if compare(op, &item, &best)? == Some(wanted) {
            best = item;
        }
    }
    Ok(best)
}

fn abs(args: Args) -> ScriptResult<Value> {
    args.expect("abs", 1)?;
    match args.value(0)? {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| ScriptError::value("integer overflow")),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(ScriptError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn int(args: Args) -> ScriptResult<Value> {
    args.expect_between("int", 0, 1)?;
    let Some(value) = args.get(0) else {
        return Ok(Value::Int(0));
    };
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) if f.is_finite() => float_to_int(f.trunc()).map(Value::Int),
        Value::Float(_) => Err(ScriptError::value("cannot convert non-finite float to int")),
        Value::Str(s) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
            ScriptError::value(format!("invalid literal for int(): {:?}", s))
        }),
        other => Err(ScriptError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float(args: Args) -> ScriptResult<Value> {
    args.expect_between("float", 0, 1)?;
    let Some(value) = args.get(0) else {
        return Ok(Value::Float(0.0));
    };
    match value {
        Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "inf" | "infinity" => Ok(Value::Float(f64::INFINITY)),
            "-inf" | "-infinity" => Ok(Value::Float(f64::NEG_INFINITY)),
            "nan" => Ok(Value::Float(f64::NAN)),
            trimmed => trimmed.parse::<f64>().map(Value::Float).map_err(|_| {
                ScriptError::value(format!("could not convert string to float: {:?}", s))
            }),
        },
        other => other.as_float().map(Value::Float).ok_or_else(|| {
            ScriptError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn range(args: Args) -> ScriptResult<Value> {
    args.expect_between("range", 1, 3)?;
    let (start, stop) = if args.len() == 1 {
        (0, args.int(0)?)
    } else {
        (args.int(0)?, args.int(1)?)
    };
    let step = if args.len() == 3 { args.int(2)? } else { 1 };
    if step == 0 {
        return Err(ScriptError::value("range() arg 3 must not be zero"));
    }

    let span = if step > 0 {
        (stop as i128 - start as i128 + step as i128 - 1) / step as i128
    } else {
        (start as i128 - stop as i128 - step as i128 - 1) / -(step as i128)
    };
    let count = span.max(0);
    if count > MAX_RANGE_LEN as i128 {
        return Err(ScriptError::value(format!(
            "range() of {} elements exceeds the limit of {}",
            count, MAX_RANGE_LEN
        )));
    }
    Ok(Value::List(
        (0..count as i64)
            .map(|i| Value::Int(start + i * step))
            .collect(),
    ))
}

fn sorted(args: Args) -> ScriptResult<Value> {
    args.expect("sorted", 1)?;
    args.allow_keywords("sorted", &["reverse"])?;
    let mut items = items_of(args.value(0)?, "sorted")?;

    // Surface the first incomparable pair instead of panicking mid-sort
    let mut failure = None;
    items.sort_by(|a, b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        match compare(BinaryOp::Lt, a, b) {
            Ok(Some(ordering)) => ordering,
            Ok(None) => Ordering::Equal,
            Err(e) => {
                failure = Some(e);
                Ordering::Equal
            }
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    if args.keyword("reverse").is_some_and(Value::is_truthy) {
        items.reverse();
    }
    Ok(Value::List(items))
}

/// `fail(message, kind='RuntimeError')` raises on purpose
fn fail(args: Args) -> ScriptResult<Value> {
    args.expect_between("fail", 0, 1)?;
    args.allow_keywords("fail", &["kind"])?;
    let message = args.get(0).map(|v| v.to_string()).unwrap_or_default();
    let kind = match args.keyword("kind").and_then(Value::as_str) {
        None | Some("RuntimeError") => ErrorKind::RuntimeError,
        Some("ValueError") => ErrorKind::ValueError,
        Some("TypeError") => ErrorKind::TypeError,
        Some("KeyError") => ErrorKind::KeyError,
        Some("IndexError") => ErrorKind::IndexError,
        Some("NameError") => ErrorKind::NameError,
        Some("ZeroDivisionError") => ErrorKind::ZeroDivisionError,
        Some(other) => {
            return Err(ScriptError::value(format!("unknown error kind '{}'", other)))
        }
    };
    Err(ScriptError::new(kind, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Kwargs;
    use pretty_assertions::assert_eq;

    fn call(name: &str, positional: Vec<Value>) -> ScriptResult<Value> {
        call_kw(name, positional, Kwargs::new())
    }

    fn call_kw(name: &str, positional: Vec<Value>, keywords: Kwargs) -> ScriptResult<Value> {
        let module = module();
        match module.member(name) {
            Some(crate::script::Object::Native(f)) => f.call(
                &crate::script::Namespace::new(),
                Args::new(positional, keywords),
            ),
            other => panic!("no builtin {}: {:?}", name, other),
        }
    }

    #[test]
    fn test_len_and_sum() {
        assert_eq!(
            call("len", vec![Value::from(vec![1, 2, 3])]).unwrap(),
            Value::Int(3)
        );
        assert_eq!(call("len", vec![Value::from("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(
            call("sum", vec![Value::from(vec![1.5, 2.5])]).unwrap(),
            Value::Float(4.0)
        );
        assert!(call("len", vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn test_min_max() {
        assert_eq!(
            call("max", vec![Value::from(vec![3, 9, 2])]).unwrap(),
            Value::Int(9)
        );
        assert_eq!(
            call("min", vec![Value::Int(4), Value::Float(1.5)]).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            call("max", vec![Value::List(vec![])]).unwrap_err().kind,
            ErrorKind::ValueError
        );
    }

    #[test]
    fn test_range() {
        assert_eq!(
            call("range", vec![Value::Int(3)]).unwrap(),
            Value::from(vec![0, 1, 2])
        );
        assert_eq!(
            call("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            Value::from(vec![5, 3, 1])
        );
        assert!(call("range", vec![Value::Int(0), Value::Int(1), Value::Int(0)]).is_err());
        assert!(call("range", vec![Value::Int(i64::MAX)]).is_err());
    }

    #[test]
    fn test_sorted() {
        let mut kw = Kwargs::new();
        kw.insert("reverse".into(), Value::Bool(true));
        assert_eq!(
            call_kw("sorted", vec![Value::from(vec![2, 3, 1])], kw).unwrap(),
            Value::from(vec![3, 2, 1])
        );
        let mixed = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(
            call("sorted", vec![mixed]).unwrap_err().kind,
            ErrorKind::TypeError
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(call("float", vec![Value::from("2.5")]).unwrap(), Value::Float(2.5));
        assert_eq!(call("str", vec![Value::Float(2.0)]).unwrap(), Value::from("2.0"));
        assert_eq!(call("repr", vec![Value::from("a")]).unwrap(), Value::from("\"a\""));
        assert!(call("int", vec![Value::from("x")]).is_err());
    }

    #[test]
    fn test_int_of_huge_float_overflows() {
        for f in [1e300, -1e19, 9.3e18] {
            let err = call("int", vec![Value::Float(f)]).unwrap_err();
            assert_eq!(err.kind, ErrorKind::ValueError);
            assert_eq!(err.message, "integer overflow");
        }
        assert_eq!(
            call("int", vec![Value::Float(-9.223372036854775808e18)]).unwrap(),
            Value::Int(i64::MIN)
        );
    }

    #[test]
    fn test_fail_kinds() {
        let mut kw = Kwargs::new();
        kw.insert("kind".into(), Value::from("ValueError"));
        let err = call_kw("fail", vec![Value::from("bad input")], kw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
        assert_eq!(err.message, "bad input");
        assert_eq!(
            call("fail", vec![]).unwrap_err().kind,
            ErrorKind::RuntimeError
        );
    }
}
