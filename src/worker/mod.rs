/*!
 * Workers
 * Lifecycle, call dispatch and the process-wide registry
 */

pub mod dispatcher;
pub mod lifecycle;
pub mod registry;

// Re-export public API
pub use lifecycle::{Worker, WorkerBuilder};
pub use registry::{list_all, WorkerHandle};
