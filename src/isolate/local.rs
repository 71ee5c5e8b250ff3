/*!
 * Local Isolates
 * In-process execution contexts, each with its own namespace
 */

use super::runtime;
use super::traits::IsolationPrimitive;
use super::types::{IsolateError, IsolateResult};
use crate::core::limits::MAX_LIVE_CONTEXTS;
use crate::core::types::ContextId;
use crate::script::{self, Namespace};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

static GLOBAL: LazyLock<Arc<LocalIsolates>> = LazyLock::new(|| Arc::new(LocalIsolates::new()));

/// Context ids are unique across instances; channel attachments are keyed by id process-wide
static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Process-wide backend used by workers that do not name one
pub fn global() -> Arc<LocalIsolates> {
    Arc::clone(&GLOBAL)
}

struct Context {
    ns: Mutex<Namespace>,
    running: AtomicBool,
}

/// Clears the running mark when a run ends, including by unwinding
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// In-process implementation of [`IsolationPrimitive`]
///
/// Code runs on the caller's thread. A context rejects a second
/// `run_code` while one is executing, and cannot be destroyed mid-run.
pub struct LocalIsolates {
    contexts: DashMap<ContextId, Arc<Context>, RandomState>,
    limit: usize,
}

impl LocalIsolates {
    pub fn new() -> Self {
        Self::with_limit(MAX_LIVE_CONTEXTS)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            contexts: DashMap::with_hasher(RandomState::new()),
            limit,
        }
    }

    /// Number of live contexts
    pub fn live(&self) -> usize {
        self.contexts.len()
    }

    fn context(&self, id: ContextId) -> IsolateResult<Arc<Context>> {
        self.contexts
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(IsolateError::UnknownContext(id))
    }
}

impl Default for LocalIsolates {
    fn default() -> Self {
        Self::new()
    }
}

impl IsolationPrimitive for LocalIsolates {
    fn create(&self) -> IsolateResult<ContextId> {
        if self.contexts.len() >= self.limit {
            return Err(IsolateError::Exhausted { limit: self.limit });
        }
        let id = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        let mut ns = Namespace::isolated(id);
        runtime::install(&mut ns);
        self.contexts.insert(
            id,
            Arc::new(Context {
                ns: Mutex::new(ns),
                running: AtomicBool::new(false),
            }),
        );
        info!(context = id, "execution context created");
        Ok(id)
    }

    fn destroy(&self, id: ContextId) -> IsolateResult<()> {
        let context = self.context(id)?;
        if context.running.load(Ordering::Acquire) {
            return Err(IsolateError::Running(id));
        }
        self.contexts.remove(&id);
        runtime::detach(id);
        info!(context = id, "execution context destroyed");
        Ok(())
    }

    fn run_code(&self, id: ContextId, code: &str) -> IsolateResult<()> {
        let context = self.context(id)?;
        if context
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(IsolateError::Running(id));
        }
        let _guard = RunningGuard(&context.running);

        debug!(context = id, len = code.len(), "running code");
        let mut ns = context.ns.lock();
        script::run(&mut ns, code)
            .map(drop)
            .map_err(|e| IsolateError::run_failed(id, e))
    }

    fn is_running(&self, id: ContextId) -> IsolateResult<bool> {
        Ok(self.context(id)?.running.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ErrorKind;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_contexts_have_separate_bindings() {
        let isolates = LocalIsolates::new();
        let a = isolates.create().unwrap();
        let b = isolates.create().unwrap();
        assert_ne!(a, b);

        // Ids do not repeat across instances
        let other = LocalIsolates::new().create().unwrap();
        assert!(other != a && other != b);

        isolates.run_code(a, "x = 1").unwrap();
        isolates.run_code(a, "x + 1").unwrap();
        let err = isolates.run_code(b, "x + 1").unwrap_err();
        assert!(matches!(
            err,
            IsolateError::RunFailed {
                kind: ErrorKind::NameError,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_context() {
        let isolates = LocalIsolates::new();
        assert_eq!(
            isolates.run_code(99, "1").unwrap_err(),
            IsolateError::UnknownContext(99)
        );
        assert!(isolates.destroy(99).is_err());
        assert!(isolates.is_running(99).is_err());
    }

    #[test]
    fn test_destroy_rejected_while_running() {
        let isolates = Arc::new(LocalIsolates::new());
        let id = isolates.create().unwrap();

        let (tx, rx) = mpsc::channel();
        let runner = {
            let isolates = Arc::clone(&isolates);
            std::thread::spawn(move || {
                tx.send(()).unwrap();
                isolates.run_code(id, "import time\ntime.sleep(0.3)")
            })
        };
        rx.recv().unwrap();
        // Let the runner enter the context
        std::thread::sleep(Duration::from_millis(100));

        assert!(isolates.is_running(id).unwrap());
        assert_eq!(isolates.destroy(id).unwrap_err(), IsolateError::Running(id));
        assert_eq!(isolates.run_code(id, "1").unwrap_err(), IsolateError::Running(id));

        runner.join().unwrap().unwrap();
        assert!(!isolates.is_running(id).unwrap());
        isolates.destroy(id).unwrap();
        assert_eq!(isolates.live(), 0);
    }

    #[test]
    fn test_limit() {
        let isolates = LocalIsolates::with_limit(1);
        let id = isolates.create().unwrap();
        assert_eq!(
            isolates.create().unwrap_err(),
            IsolateError::Exhausted { limit: 1 }
        );
        isolates.destroy(id).unwrap();
        assert!(isolates.create().is_ok());
    }

    #[test]
    fn test_terminal_unavailable_inside() {
        let isolates = LocalIsolates::new();
        let id = isolates.create().unwrap();
        let err = isolates.run_code(id, "import terminal").unwrap_err();
        assert!(matches!(
            err,
            IsolateError::RunFailed {
                kind: ErrorKind::ImportError,
                ..
            }
        ));
    }

    #[test]
    fn test_intrinsics_installed() {
        let isolates = LocalIsolates::new();
        let id = isolates.create().unwrap();
        // Without a channel the receiving routine refuses to run
        let err = isolates.run_code(id, "_call(0)").unwrap_err();
        assert!(matches!(
            err,
            IsolateError::RunFailed {
                kind: ErrorKind::RuntimeError,
                ..
            }
        ));
        isolates.run_code(id, "_exit()").unwrap();
    }
}
