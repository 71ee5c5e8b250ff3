/*!
 * Environment Replicator
 *
 * Makes a session-defined function callable inside a worker by shipping
 * its definition, plus whatever the session has bound at top level that
 * the function may reach: other defined functions, imported modules and
 * names imported from modules.
 *
 * Failing to ship the target function aborts the call. Failing to ship
 * anything else is logged and skipped, and nothing is cached for it.
 */

pub mod cache;

// Re-export public API
pub use cache::{Fingerprint, ReplicationCache};

use crate::core::errors::{WorkerError, WorkerResult};
use crate::core::types::ContextId;
use crate::isolate::runtime::RUNTIME_MODULE;
use crate::isolate::IsolationPrimitive;
use crate::modules::BUILTINS;
use crate::script::{Object, Scope, ScriptFunction};
use log::{debug, warn};
use std::fmt;

/// What one replication pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Function definitions run in the worker
    pub shipped: Vec<String>,
    /// Modules imported in the worker
    pub imported: Vec<String>,
    /// Bindings made to functions or module members
    pub aliased: Vec<String>,
    /// Bindings that could not be replicated
    pub skipped: Vec<String>,
}

impl ReplicationReport {
    /// Nothing was sent or skipped
    pub fn is_empty(&self) -> bool {
        self.shipped.is_empty()
            && self.imported.is_empty()
            && self.aliased.is_empty()
            && self.skipped.is_empty()
    }
}

impl fmt::Display for ReplicationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shipped [{}] imported [{}] aliased [{}] skipped [{}]",
            self.shipped.join(", "),
            self.imported.join(", "),
            self.aliased.join(", "),
            self.skipped.join(", ")
        )
    }
}

/// Replication into one context
struct Replicator<'a> {
    backend: &'a dyn IsolationPrimitive,
    context: ContextId,
    cache: &'a mut ReplicationCache,
    report: ReplicationReport,
}

impl Replicator<'_> {
    /// Run `code` unless `name` already carries `fingerprint`.
    /// Returns whether the code ran.
    fn ensure(&mut self, name: &str, fingerprint: Fingerprint, code: &str) -> Result<bool, String> {
        if self.cache.is_current(name, &fingerprint) {
            return Ok(false);
        }
        self.backend
            .run_code(self.context, code)
            .map_err(|e| e.to_string())?;
        self.cache.record(name, fingerprint);
        Ok(true)
    }

    /// Define `function` in the worker under `binding`
    fn ship_function(&mut self, binding: &str, function: &ScriptFunction) -> Result<(), String> {
        let (Some(name), Some(source)) = (function.def.name.as_deref(), function.source()) else {
            return Err("anonymous function has no source".to_string());
        };
        let code = rename_def(source, name, binding)
            .ok_or_else(|| format!("cannot rebind definition of '{}' to '{}'", name, binding))?;
        let fingerprint = self.cache.source_fingerprint(&code);
        if self.ensure(binding, fingerprint, &code)? {
            if binding == name {
                self.report.shipped.push(binding.to_string());
            } else {
                self.report.aliased.push(binding.to_string());
            }
        }
        Ok(())
    }

    fn skip(&mut self, binding: &str, reason: &str) {
        warn!("context {}: not replicating '{}': {}", self.context, binding, reason);
        self.report.skipped.push(binding.to_string());
    }

    fn function(&mut self, binding: &str, function: &ScriptFunction) {
        if let Err(reason) = self.ship_function(binding, function) {
            self.skip(binding, &reason);
        }
    }

    fn member(&mut self, binding: &str, module: &str, name: &str) {
        if module == RUNTIME_MODULE || (module == BUILTINS && binding == name) {
            return;
        }
        let code = if binding == name {
            format!("from {} import {}", module, name)
        } else {
            format!("from {} import {} as {}", module, name, binding)
        };
        match self.ensure(binding, Fingerprint::Alias(format!("{}.{}", module, name)), &code) {
            Ok(true) => self.report.aliased.push(binding.to_string()),
            Ok(false) => {}
            Err(reason) => self.skip(binding, &reason),
        }
    }

    fn module(&mut self, binding: &str, module: &str, submodules: &[String]) {
        let code = if binding == module {
            format!("import {}", module)
        } else {
            format!("import {} as {}", module, binding)
        };
        match self.ensure(binding, Fingerprint::Module(module.to_string()), &code) {
            Ok(true) => self.report.imported.push(module.to_string()),
            Ok(false) => {}
            Err(reason) => {
                self.skip(binding, &reason);
                return;
            }
        }
        if binding != module {
            return;
        }
        // `import pkg.sub` in the session binds `pkg`; the worker needs
        // the submodule imported too for `pkg.sub` to resolve
        let prefix = format!("{}.", module);
        for sub in submodules.iter().filter(|s| s.starts_with(&prefix)) {
            match self.ensure(sub, Fingerprint::Module(sub.clone()), &format!("import {}", sub)) {
                Ok(true) => self.report.imported.push(sub.clone()),
                Ok(false) => {}
                Err(reason) => self.skip(sub, &reason),
            }
        }
    }
}

/// Rewrite the header of a `def` so the definition binds `binding`.
///
/// Each binding gets its own copy of the definition, so rebinding a name
/// in the session never disturbs another binding of an older version.
fn rename_def(source: &str, name: &str, binding: &str) -> Option<String> {
    if binding == name {
        return Some(source.to_string());
    }
    let rest = source.strip_prefix("def")?;
    let after_keyword = rest.trim_start();
    let gap = &rest[..rest.len() - after_keyword.len()];
    if gap.is_empty() {
        return None;
    }
    let after_name = after_keyword.strip_prefix(name)?;
    if !after_name.trim_start().starts_with('(') {
        return None;
    }
    Some(format!("def{}{}{}", gap, binding, after_name))
}

/// Worker-side name under which `function` is called
///
/// The session binding that holds this exact function, preferring its own
/// `def` name. A function no longer bound anywhere (its name was since
/// redefined) gets a private name derived from its source.
pub fn target_binding(function: &ScriptFunction, scope: &Scope) -> String {
    let name = function.name();
    let holds = |object: Option<&Object>| {
        matches!(object, Some(Object::Function(f)) if std::ptr::eq(f.as_ref(), function))
    };

    let ns = scope.read();
    if holds(ns.get(name)) {
        return name.to_string();
    }
    if let Some((binding, _)) = ns
        .bindings()
        .into_iter()
        .find(|(_, object)| holds(Some(object)))
    {
        return binding;
    }
    let hash = ReplicationCache::new().source_hash(function.source().unwrap_or_default());
    format!("_{}_{:016x}", name, hash)
}

/// Ship `function` and the session state around it into `context`
pub fn replicate(
    backend: &dyn IsolationPrimitive,
    context: ContextId,
    cache: &mut ReplicationCache,
    function: &ScriptFunction,
    scope: &Scope,
) -> WorkerResult<ReplicationReport> {
    let target = target_binding(function, scope);

    let mut replicator = Replicator {
        backend,
        context,
        cache,
        report: ReplicationReport::default(),
    };
    replicator
        .ship_function(&target, function)
        .map_err(|reason| WorkerError::ReplicationFailed {
            symbol: target.clone(),
            reason,
        })?;

    // Snapshot so the session is not locked while the worker runs code
    let (bindings, submodules) = {
        let ns = scope.read();
        (ns.bindings(), ns.imported())
    };
    for (binding, object) in &bindings {
        match object {
            Object::Function(f) => replicator.function(binding, f),
            Object::Native(n) => replicator.member(binding, &n.module, &n.name),
            Object::Module(m) => replicator.module(binding, m.name(), &submodules),
            Object::Value(_) => {}
        }
    }

    debug!("context {}: replicated '{}': {}", context, target, replicator.report);
    Ok(replicator.report)
}
