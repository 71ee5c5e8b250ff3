/*!
 * Isolation Primitive
 * Backend abstraction for independent execution contexts
 */

use super::types::IsolateResult;
use crate::core::types::ContextId;

/// Creates, runs and destroys execution contexts
///
/// Each context owns its top-level bindings. `run_code` executes on the
/// calling thread and returns once the code finishes.
#[cfg_attr(test, mockall::automock)]
pub trait IsolationPrimitive: Send + Sync {
    /// Create a fresh context
    fn create(&self) -> IsolateResult<ContextId>;

    /// Destroy a context; fails while it is running
    fn destroy(&self, id: ContextId) -> IsolateResult<()>;

    /// Execute code text inside a context
    fn run_code(&self, id: ContextId, code: &str) -> IsolateResult<()>;

    /// Whether the context is executing code right now
    fn is_running(&self, id: ContextId) -> IsolateResult<bool>;
}
