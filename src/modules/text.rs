/*!
 * Text Modules
 * `text` and its submodule `text.case`
 */

use super::catalog::NativeModule;
use crate::protocol::Value;
use crate::script::{Args, ScriptError, ScriptResult};

pub(super) fn module() -> NativeModule {
    NativeModule::new("text")
        .function("upper", |_, args| map_str(args, "upper", |s| s.to_uppercase()))
        .function("lower", |_, args| map_str(args, "lower", |s| s.to_lowercase()))
        .function("strip", |_, args| map_str(args, "strip", |s| s.trim().to_string()))
        .function("split", |_, args| split(args))
        .function("join", |_, args| join(args))
        .function("replace", |_, args| {
            args.expect("replace", 3)?;
            Ok(Value::Str(
                args.str(0)?.replace(args.str(1)?, args.str(2)?),
            ))
        })
}

pub(super) fn case_module() -> NativeModule {
    NativeModule::new("text.case")
        .function("title", |_, args| map_str(args, "title", title))
        .function("swapcase", |_, args| {
            map_str(args, "swapcase", |s| {
                s.chars()
                    .flat_map(|c| {
                        if c.is_uppercase() {
                            c.to_lowercase().collect::<Vec<_>>()
                        } else {
                            c.to_uppercase().collect::<Vec<_>>()
                        }
                    })
                    .collect()
            })
        })
}

fn map_str(args: Args, name: &str, f: impl Fn(&str) -> String) -> ScriptResult<Value> {
    args.expect(name, 1)?;
    Ok(Value::Str(f(args.str(0)?)))
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// `split(s, sep=None)`; no separator splits on runs of whitespace
fn split(args: Args) -> ScriptResult<Value> {
    args.expect_between("split", 1, 2)?;
    args.allow_keywords("split", &["sep"])?;
    let s = args.str(0)?;
    let sep = args
        .get(1)
        .or_else(|| args.keyword("sep"))
        .filter(|v| !matches!(v, Value::None));
    let parts: Vec<Value> = match sep {
        None => s.split_whitespace().map(Value::from).collect(),
        Some(Value::Str(sep)) if sep.is_empty() => {
            return Err(ScriptError::value("empty separator"))
        }
        Some(Value::Str(sep)) => s.split(sep.as_str()).map(Value::from).collect(),
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "must be str or None, not {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::List(parts))
}

/// `join(items, sep='')`
fn join(args: Args) -> ScriptResult<Value> {
    args.expect_between("join", 1, 2)?;
    args.allow_keywords("join", &["sep"])?;
    let sep = match args.get(1).or_else(|| args.keyword("sep")) {
        Some(Value::Str(s)) => s.as_str(),
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "separator must be str, not {}",
                other.type_name()
            )))
        }
        None => "",
    };
    let items = args.value(0)?.as_list().ok_or_else(|| {
        ScriptError::type_error("join() expects a list of strings")
    })?;
    let parts = items
        .iter()
        .map(|item| {
            item.as_str().ok_or_else(|| {
                ScriptError::type_error(format!(
                    "sequence item: expected str instance, {} found",
                    item.type_name()
                ))
            })
        })
        .collect::<ScriptResult<Vec<_>>>()?;
    Ok(Value::Str(parts.join(sep)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Kwargs;
    use crate::script::{Namespace, Object};
    use pretty_assertions::assert_eq;

    fn call_in(module: NativeModule, name: &str, positional: Vec<Value>) -> ScriptResult<Value> {
        match module.member(name) {
            Some(Object::Native(f)) => {
                f.call(&Namespace::new(), Args::new(positional, Kwargs::new()))
            }
            other => panic!("no {}.{}: {:?}", module.name(), name, other),
        }
    }

    #[test]
    fn test_split_and_join() {
        assert_eq!(
            call_in(module(), "split", vec![Value::from("  a b  c ")]).unwrap(),
            Value::from(vec!["a", "b", "c"])
        );
        assert_eq!(
            call_in(module(), "split", vec![Value::from("a,,b"), Value::from(",")]).unwrap(),
            Value::from(vec!["a", "", "b"])
        );
        assert_eq!(
            call_in(
                module(),
                "join",
                vec![Value::from(vec!["x", "y"]), Value::from("-")]
            )
            .unwrap(),
            Value::from("x-y")
        );
        assert!(call_in(module(), "join", vec![Value::from(vec![1])]).is_err());
    }

    #[test]
    fn test_case_functions() {
        assert_eq!(
            call_in(case_module(), "title", vec![Value::from("hello wORLD")]).unwrap(),
            Value::from("Hello World")
        );
        assert_eq!(
            call_in(case_module(), "swapcase", vec![Value::from("aBc")]).unwrap(),
            Value::from("AbC")
        );
    }
}
