/*!
 * Session
 * The controller's top-level scope, where ad hoc functions are defined
 */

use super::error::{ScriptError, ScriptResult};
use super::eval::{self, call_with_values};
use super::namespace::{Namespace, Object};
use crate::callable::Callable;
use crate::modules::{catalog, BUILTINS};
use crate::protocol::{Kwargs, Value};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a namespace
#[derive(Clone, Default)]
pub struct Scope(Arc<RwLock<Namespace>>);

impl Scope {
    pub fn new(ns: Namespace) -> Self {
        Self(Arc::new(RwLock::new(ns)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Namespace> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Namespace> {
        self.0.write()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("bindings", &self.0.read().len())
            .finish()
    }
}

/// Controller-side interactive scope
///
/// ```
/// use subworker::protocol::{Kwargs, Value};
/// use subworker::script::Session;
///
/// let session = Session::new();
/// session.eval("def double(x): x * 2").unwrap();
/// let double = session.callable("double").unwrap();
/// let out = double.call_local(&[Value::from(21)], &Kwargs::new()).unwrap();
/// assert_eq!(out, Value::from(42));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Session {
    scope: Scope,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Execute code; returns the value of a trailing expression
    pub fn eval(&self, code: &str) -> ScriptResult<Object> {
        let mut ns = self.scope.write();
        eval::run(&mut ns, code)
    }

    pub fn eval_value(&self, code: &str) -> ScriptResult<Value> {
        self.eval(code)?.into_value()
    }

    pub fn get(&self, name: &str) -> Option<Object> {
        self.scope.read().get(name).cloned()
    }

    /// Resolve a name to something a worker can be asked to run
    pub fn callable(&self, name: &str) -> ScriptResult<Callable> {
        let object = match self.get(name) {
            Some(object) => object,
            None => catalog()
                .get(BUILTINS)
                .and_then(|builtins| builtins.member(name))
                .ok_or_else(|| ScriptError::name(name))?,
        };
        match object {
            Object::Function(function) => Ok(Callable::Script {
                function,
                scope: self.scope.clone(),
            }),
            Object::Native(native) => Ok(Callable::qualified(&native.module, &native.name)),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Call a bound function here, in the controller
    pub fn call(&self, name: &str, args: &[Value], kwargs: &Kwargs) -> ScriptResult<Value> {
        let object = self
            .get(name)
            .ok_or_else(|| ScriptError::name(name))?;
        let ns = self.scope.read();
        call_with_values(&ns, &object, args, kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_state_persists_between_evals() {
        let session = Session::new();
        session.eval("base = 10").unwrap();
        session.eval("def shifted(x): x + base").unwrap();
        assert_eq!(
            session
                .call("shifted", &[Value::from(5)], &Kwargs::new())
                .unwrap(),
            Value::from(15)
        );
    }

    #[test]
    fn test_callable_kinds() {
        let session = Session::new();
        session
            .eval("from math import sqrt as root\ndef f(x): x\ng = lambda y: y")
            .unwrap();

        match session.callable("root").unwrap() {
            Callable::Qualified { module, name } => {
                assert_eq!((module.as_str(), name.as_str()), ("math", "sqrt"))
            }
            other => panic!("expected qualified, got {}", other),
        }
        assert!(matches!(
            session.callable("f").unwrap(),
            Callable::Script { .. }
        ));
        assert!(matches!(
            session.callable("len").unwrap(),
            Callable::Qualified { .. }
        ));
        assert!(session.callable("g").unwrap().to_ref().is_err());
    }

    #[test]
    fn test_non_callables_rejected() {
        let session = Session::new();
        session.eval("x = 3").unwrap();
        assert_eq!(
            session.callable("x").unwrap_err().kind,
            ErrorKind::TypeError
        );
        assert_eq!(
            session.callable("nothing").unwrap_err().kind,
            ErrorKind::NameError
        );
    }
}
