/*!
 * Module Catalog
 * Process-wide table of native modules importable from script code
 *
 * Controller sessions and isolated contexts run in the same binary and
 * share this table, so a qualified name resolves identically on both
 * sides of a channel.
 */

use super::{builtins, math, system, text};
use crate::script::{Args, Namespace, NativeFunction, Object, ScriptError, ScriptResult};
use crate::protocol::Value;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Name of the module searched after a namespace's own bindings
pub const BUILTINS: &str = "builtins";

static CATALOG: LazyLock<Catalog> = LazyLock::new(Catalog::with_defaults);

/// The process-wide catalog
#[inline]
pub fn catalog() -> &'static Catalog {
    &CATALOG
}

/// A module member
#[derive(Debug, Clone)]
pub enum Member {
    Function(Arc<NativeFunction>),
    Constant(Value),
}

/// A named group of native functions and constants
pub struct NativeModule {
    name: String,
    isolate_safe: bool,
    members: BTreeMap<String, Member>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isolate_safe: true,
            members: BTreeMap::new(),
        }
    }

    /// Whether isolated contexts may import this module
    #[must_use]
    pub fn with_isolate_safe(mut self, safe: bool) -> Self {
        self.isolate_safe = safe;
        self
    }

    #[must_use]
    pub fn function<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&Namespace, Args) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        let native = NativeFunction::new(self.name.clone(), name, func);
        self.members
            .insert(name.to_string(), Member::Function(Arc::new(native)));
        self
    }

    #[must_use]
    pub fn constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.members
            .insert(name.to_string(), Member::Constant(value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_isolate_safe(&self) -> bool {
        self.isolate_safe
    }

    pub fn member(&self, name: &str) -> Option<Object> {
        self.members.get(name).map(|member| match member {
            Member::Function(f) => Object::Native(Arc::clone(f)),
            Member::Constant(v) => Object::Value(v.clone()),
        })
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("name", &self.name)
            .field("isolate_safe", &self.isolate_safe)
            .field("members", &self.members.len())
            .finish()
    }
}

/// Registry of modules keyed by dotted name
pub struct Catalog {
    modules: DashMap<String, Arc<NativeModule>, RandomState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            modules: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Catalog preloaded with the standard modules
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        for module in [
            builtins::module(),
            math::module(),
            text::module(),
            text::case_module(),
            system::time_module(),
            system::terminal_module(),
        ] {
            catalog.register(module);
        }
        debug!("Module catalog initialized with {} modules", catalog.len());
        catalog
    }

    /// Add or replace a module; returns the previous one
    pub fn register(&self, module: NativeModule) -> Option<Arc<NativeModule>> {
        let name = module.name.clone();
        let previous = self.modules.insert(name.clone(), Arc::new(module));
        if previous.is_some() {
            info!("Replaced module '{}' in catalog", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<NativeModule>> {
        self.modules.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Resolve a module for import, honouring isolation restrictions
    pub fn import(&self, name: &str, isolated: bool) -> ScriptResult<Arc<NativeModule>> {
        let module = self
            .get(name)
            .ok_or_else(|| ScriptError::import(name, "no such module"))?;
        if isolated && !module.isolate_safe {
            return Err(ScriptError::import(
                name,
                "not available in isolated contexts",
            ));
        }
        Ok(module)
    }

    /// Sorted module names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
