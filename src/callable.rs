/*!
 * Callables
 * What a worker can be asked to run
 */

use crate::modules::catalog;
use crate::protocol::{CallableRef, CodecError, CodecResult, Kwargs, Value};
use crate::script::{
    call_with_values, ErrorKind, Namespace, Object, Scope, ScriptError, ScriptFunction,
    ScriptResult,
};
use std::fmt;
use std::sync::Arc;

/// A function to run in a worker
///
/// Qualified callables resolve through the module catalog on both sides
/// and travel by reference. Script callables were defined in a controller
/// [`Session`](crate::script::Session) and must be replicated into the
/// worker before they can be referenced there.
#[derive(Clone)]
pub enum Callable {
    Qualified { module: String, name: String },
    Script {
        function: Arc<ScriptFunction>,
        scope: Scope,
    },
}

impl Callable {
    pub fn qualified(module: impl Into<String>, name: impl Into<String>) -> Self {
        Callable::Qualified {
            module: module.into(),
            name: name.into(),
        }
    }

    /// A function from the `builtins` module
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::qualified(crate::modules::BUILTINS, name)
    }

    pub fn needs_replication(&self) -> bool {
        matches!(self, Callable::Script { .. })
    }

    /// Reference written into the channel
    pub fn to_ref(&self) -> CodecResult<CallableRef> {
        match self {
            Callable::Qualified { module, name } => Ok(CallableRef::Qualified {
                module: module.clone(),
                name: name.clone(),
            }),
            Callable::Script { function, .. } => match &function.def.name {
                Some(name) if function.source().is_some() => {
                    Ok(CallableRef::Global { name: name.clone() })
                }
                _ => Err(CodecError::Unserializable(format!(
                    "anonymous function '{}' cannot be sent by reference",
                    function.name()
                ))),
            },
        }
    }

    /// Run in the calling thread, as the worker would
    pub fn call_local(&self, args: &[Value], kwargs: &Kwargs) -> ScriptResult<Value> {
        match self {
            Callable::Qualified { module, name } => {
                let ns = Namespace::new();
                let target = catalog().import(module, false)?.member(name).ok_or_else(|| {
                    ScriptError::new(
                        ErrorKind::AttributeError,
                        format!("module '{}' has no attribute '{}'", module, name),
                    )
                })?;
                call_with_values(&ns, &target, args, kwargs)
            }
            Callable::Script { function, scope } => {
                let ns = scope.read();
                call_with_values(&ns, &Object::Function(Arc::clone(function)), args, kwargs)
            }
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Qualified { module, name } => write!(f, "{}.{}", module, name),
            Callable::Script { function, .. } => f.write_str(function.name()),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Qualified { module, name } => f
                .debug_struct("Qualified")
                .field("module", module)
                .field("name", name)
                .finish(),
            Callable::Script { function, .. } => f
                .debug_struct("Script")
                .field("name", &function.name())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Session;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_reference() {
        let len = Callable::builtin("len");
        assert_eq!(
            len.to_ref().unwrap(),
            CallableRef::Qualified {
                module: "builtins".into(),
                name: "len".into()
            }
        );
        assert_eq!(len.to_string(), "builtins.len");
        assert!(!len.needs_replication());
    }

    #[test]
    fn test_local_call_matches_definition() {
        let session = Session::new();
        session.eval("def hyp(a, b): (a * a + b * b) ** 0.5").unwrap();
        let hyp = session.callable("hyp").unwrap();
        assert!(hyp.needs_replication());
        assert_eq!(
            hyp.call_local(&[Value::from(3), Value::from(4)], &Kwargs::new())
                .unwrap(),
            Value::Float(5.0)
        );
        assert_eq!(
            hyp.to_ref().unwrap(),
            CallableRef::Global { name: "hyp".into() }
        );
    }

    #[test]
    fn test_lambda_is_unserializable() {
        let session = Session::new();
        session.eval("sq = lambda v: v * v").unwrap();
        let sq = session.callable("sq").unwrap();
        assert!(matches!(sq.to_ref(), Err(CodecError::Unserializable(_))));
        // Still callable locally
        assert_eq!(
            sq.call_local(&[Value::from(3)], &Kwargs::new()).unwrap(),
            Value::from(9)
        );
    }

    #[test]
    fn test_unknown_member() {
        let missing = Callable::qualified("math", "nope");
        assert!(missing.call_local(&[], &Kwargs::new()).is_err());
    }
}
