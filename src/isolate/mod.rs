/*!
 * Isolation
 * Execution contexts and the receiving routine that serves channel calls
 */

pub mod local;
pub mod runtime;
pub mod traits;
pub mod types;

// Re-export public API
pub use local::{global, LocalIsolates};
pub use traits::IsolationPrimitive;
pub use types::{IsolateError, IsolateResult};

#[cfg(test)]
pub use traits::MockIsolationPrimitive;
