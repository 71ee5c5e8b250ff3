/*!
 * Math Module
 */

use super::catalog::NativeModule;
use crate::protocol::Value;
use crate::script::ops::float_to_int;
use crate::script::{Args, ScriptError, ScriptResult};

/// Largest argument `factorial` accepts before overflowing i64
const MAX_FACTORIAL: i64 = 20;

pub(super) fn module() -> NativeModule {
    NativeModule::new("math")
        .constant("pi", std::f64::consts::PI)
        .constant("e", std::f64::consts::E)
        .function("sqrt", |_, args| {
            args.expect("sqrt", 1)?;
            let x = args.float(0)?;
            if x < 0.0 {
                return Err(ScriptError::value("math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        })
        .function("pow", |_, args| {
            args.expect("pow", 2)?;
            Ok(Value::Float(args.float(0)?.powf(args.float(1)?)))
        })
        .function("floor", |_, args| round_with(args, "floor", f64::floor))
        .function("ceil", |_, args| round_with(args, "ceil", f64::ceil))
        .function("gcd", |_, args| {
            let mut acc: i64 = 0;
            for i in 0..args.len() {
                acc = gcd(acc, args.int(i)?);
            }
            Ok(Value::Int(acc))
        })
        .function("factorial", |_, args| {
            args.expect("factorial", 1)?;
            let n = args.int(0)?;
            if n < 0 {
                return Err(ScriptError::value(
                    "factorial() not defined for negative values",
                ));
            }
            if n > MAX_FACTORIAL {
                return Err(ScriptError::value("integer overflow"));
            }
            Ok(Value::Int((1..=n).product()))
        })
}

fn round_with(args: Args, name: &str, op: fn(f64) -> f64) -> ScriptResult<Value> {
    args.expect(name, 1)?;
    match args.value(0)? {
        Value::Int(i) => Ok(Value::Int(*i)),
        other => {
            let x = other.as_float().ok_or_else(|| {
                ScriptError::type_error(format!(
                    "must be real number, not {}",
                    other.type_name()
                ))
            })?;
            if !x.is_finite() {
                return Err(ScriptError::value(format!(
                    "cannot convert {} to integer",
                    x
                )));
            }
            float_to_int(op(x)).map(Value::Int)
        }
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    i64::try_from(a).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Namespace, Object};
    use crate::protocol::Kwargs;
    use pretty_assertions::assert_eq;

    fn call(name: &str, positional: Vec<Value>) -> ScriptResult<Value> {
        match module().member(name) {
            Some(Object::Native(f)) => {
                f.call(&Namespace::new(), Args::new(positional, Kwargs::new()))
            }
            other => panic!("no math.{}: {:?}", name, other),
        }
    }

    #[test]
    fn test_sqrt_domain() {
        assert_eq!(call("sqrt", vec![Value::Int(16)]).unwrap(), Value::Float(4.0));
        assert!(call("sqrt", vec![Value::Int(-1)]).is_err());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(call("floor", vec![Value::Float(-1.5)]).unwrap(), Value::Int(-2));
        assert_eq!(call("ceil", vec![Value::Float(1.2)]).unwrap(), Value::Int(2));
        assert!(call("floor", vec![Value::Float(f64::NAN)]).is_err());
    }

    #[test]
    fn test_rounding_out_of_range_overflows() {
        let err = call("floor", vec![Value::Float(1e300)]).unwrap_err();
        assert_eq!(err.kind, crate::script::ErrorKind::ValueError);
        assert_eq!(err.message, "integer overflow");
        assert!(call("ceil", vec![Value::Float(-1e19)]).is_err());
        assert!(call("ceil", vec![Value::Float(9.223372036854775e18)]).is_ok());
    }

    #[test]
    fn test_integer_functions() {
        assert_eq!(
            call("gcd", vec![Value::Int(12), Value::Int(-18)]).unwrap(),
            Value::Int(6)
        );
        assert_eq!(call("factorial", vec![Value::Int(5)]).unwrap(), Value::Int(120));
        assert!(call("factorial", vec![Value::Int(21)]).is_err());
    }

    #[test]
    fn test_constants() {
        assert!(matches!(
            module().member("pi"),
            Some(Object::Value(Value::Float(p))) if (p - 3.14159).abs() < 1e-4
        ));
    }
}
