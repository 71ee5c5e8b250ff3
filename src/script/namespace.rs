/*!
 * Namespace
 * Runtime objects and the top-level bindings of one execution context
 */

use super::ast::FunctionDef;
use super::error::{ScriptError, ScriptResult};
use crate::core::types::ContextId;
use crate::modules::NativeModule;
use crate::protocol::{Kwargs, Value};
use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use std::fmt;
use std::sync::Arc;

/// Signature of a native function body
pub type NativeFn = dyn Fn(&Namespace, Args) -> ScriptResult<Value> + Send + Sync;

/// A function implemented in Rust and exposed through a module
pub struct NativeFunction {
    /// Qualified module name, e.g. `text.case`
    pub module: String,
    pub name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(module: impl Into<String>, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Namespace, Args) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        Self {
            module: module.into(),
            name: name.into(),
            func: Box::new(func),
        }
    }

    #[inline]
    pub fn call(&self, ns: &Namespace, args: Args) -> ScriptResult<Value> {
        (self.func)(ns, args)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native function {}.{}>", self.module, self.name)
    }
}

/// A function defined in script code
#[derive(Debug)]
pub struct ScriptFunction {
    pub def: Arc<FunctionDef>,
    /// Default values, evaluated when the definition ran
    pub defaults: Vec<Option<Object>>,
    /// Enclosing locals captured by nested lambdas
    pub captured: HashMap<String, Object>,
}

impl ScriptFunction {
    pub fn name(&self) -> &str {
        self.def.display_name()
    }

    pub fn source(&self) -> Option<&str> {
        self.def.source.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.def.is_anonymous()
    }
}

/// Anything a name can be bound to
#[derive(Debug, Clone)]
pub enum Object {
    Value(Value),
    Module(Arc<NativeModule>),
    Function(Arc<ScriptFunction>),
    Native(Arc<NativeFunction>),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Value(v) => v.type_name(),
            Object::Module(_) => "module",
            Object::Function(_) => "function",
            Object::Native(_) => "builtin_function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Value(v) => v.is_truthy(),
            _ => true,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Object::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Plain data view; modules and functions cannot leave a context
    pub fn into_value(self) -> ScriptResult<Value> {
        match self {
            Object::Value(v) => Ok(v),
            other => Err(ScriptError::type_error(format!(
                "{} object is not plain data",
                other.type_name()
            ))),
        }
    }
}

impl From<Value> for Object {
    fn from(value: Value) -> Self {
        Object::Value(value)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Value(v) => write!(f, "{}", v),
            Object::Module(m) => write!(f, "<module '{}'>", m.name()),
            Object::Function(func) => write!(f, "<function {}>", func.name()),
            Object::Native(func) => write!(f, "<built-in function {}>", func.name),
        }
    }
}

/// Arguments handed to a native function
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Kwargs,
}

impl Args {
    pub fn new(positional: Vec<Value>, keywords: Kwargs) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Fail unless between `min` and `max` positional arguments were passed
    pub fn expect_between(&self, name: &str, min: usize, max: usize) -> ScriptResult<()> {
        let n = self.positional.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("{}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(ScriptError::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                name, expected, n
            )));
        }
        Ok(())
    }

    pub fn expect(&self, name: &str, n: usize) -> ScriptResult<()> {
        self.expect_between(name, n, n)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn value(&self, index: usize) -> ScriptResult<&Value> {
        self.positional
            .get(index)
            .ok_or_else(|| ScriptError::type_error(format!("missing argument {}", index + 1)))
    }

    pub fn int(&self, index: usize) -> ScriptResult<i64> {
        let value = self.value(index)?;
        value.as_int().ok_or_else(|| {
            ScriptError::type_error(format!("expected int, got {}", value.type_name()))
        })
    }

    pub fn float(&self, index: usize) -> ScriptResult<f64> {
        let value = self.value(index)?;
        value.as_float().ok_or_else(|| {
            ScriptError::type_error(format!("expected number, got {}", value.type_name()))
        })
    }

    pub fn str(&self, index: usize) -> ScriptResult<&str> {
        let value = self.value(index)?;
        value.as_str().ok_or_else(|| {
            ScriptError::type_error(format!("expected str, got {}", value.type_name()))
        })
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.get(name)
    }

    /// Fail if any keyword outside `allowed` was passed
    pub fn allow_keywords(&self, func: &str, allowed: &[&str]) -> ScriptResult<()> {
        match self
            .keywords
            .keys()
            .find(|k| !allowed.contains(&k.as_str()))
        {
            Some(k) => Err(ScriptError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, k
            ))),
            None => Ok(()),
        }
    }
}

/// Top-level bindings of one context
#[derive(Debug, Default)]
pub struct Namespace {
    bindings: HashMap<String, Object>,
    /// Dotted module names imported here; gates submodule attribute access
    imported: HashSet<String>,
    /// Isolated contexts may only import isolate-safe modules
    isolated: bool,
    /// Owning execution context, if any
    context: Option<ContextId>,
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            imported: HashSet::new(),
            isolated: false,
            context: None,
        }
    }

    /// Namespace of an isolated execution context
    pub fn isolated(context: ContextId) -> Self {
        Self {
            isolated: true,
            context: Some(context),
            ..Self::new()
        }
    }

    #[inline]
    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    #[inline]
    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    pub fn get(&self, name: &str) -> Option<&Object> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, object: Object) {
        self.bindings.insert(name.into(), object);
    }

    pub fn remove(&mut self, name: &str) -> Option<Object> {
        self.bindings.remove(name)
    }

    /// All bindings, sorted by name
    pub fn bindings(&self) -> Vec<(String, Object)> {
        let mut all: Vec<_> = self
            .bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Record `module` and its parent packages as imported
    pub fn mark_imported(&mut self, module: &str) {
        let mut prefix = String::new();
        for segment in module.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            self.imported.insert(prefix.clone());
        }
    }

    pub fn has_imported(&self, module: &str) -> bool {
        self.imported.contains(module)
    }

    /// Dotted names imported here, sorted
    pub fn imported(&self) -> Vec<String> {
        let mut names: Vec<String> = self.imported.iter().cloned().collect();
        names.sort();
        names
    }
}
