/*!
 * Protocol Messages
 * Request and response shapes carried by the channel
 */

use super::value::{Kwargs, Value};
use crate::script::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the worker finds the callable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallableRef {
    /// Importable: `module.name` in the module catalog
    Qualified { module: String, name: String },
    /// Top-level binding in the worker, present after replication
    Global { name: String },
}

impl fmt::Display for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallableRef::Qualified { module, name } => write!(f, "{}.{}", module, name),
            CallableRef::Global { name } => write!(f, "{}", name),
        }
    }
}

/// A decoded request: callable reference, positional and keyword arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub callable: CallableRef,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

/// Error marker written when the callable raised inside the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

/// What the worker writes after the flag byte
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Return(Value),
    Raised(RemoteError),
}

/// `f(1, 'a', key=2)` style rendering of arguments for diagnostics
pub fn render_args(args: &[Value], kwargs: &Kwargs) -> String {
    let mut parts: Vec<String> = args.iter().map(Value::repr).collect();
    parts.extend(kwargs.iter().map(|(k, v)| format!("{}={}", k, v.repr())));
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callable_ref_display() {
        let qualified = CallableRef::Qualified {
            module: "math".into(),
            name: "sqrt".into(),
        };
        assert_eq!(qualified.to_string(), "math.sqrt");
        let global = CallableRef::Global { name: "f".into() };
        assert_eq!(global.to_string(), "f");
    }

    #[test]
    fn test_render_args() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("sep".into(), Value::from(","));
        let rendered = render_args(&[Value::from(1), Value::from("x")], &kwargs);
        assert_eq!(rendered, "(1, \"x\", sep=\",\")");
    }
}
