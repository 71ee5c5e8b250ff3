/*!
 * Subworker Library
 * Isolated execution contexts driven over a shared memory channel
 *
 * A [`Worker`] owns one execution context and one channel. Calls are
 * encoded into the channel's payload region, run inside the context by its
 * receiving routine, and answered through the return region. Functions
 * defined in a controller [`Session`] are replicated into the worker on
 * first use.
 */

pub mod callable;
pub mod channel;
pub mod config;
pub mod core;
pub mod isolate;
pub mod modules;
pub mod monitoring;
pub mod protocol;
pub mod replicator;
pub mod script;
pub mod worker;

// Re-exports
pub use callable::Callable;
pub use config::WorkerConfig;
pub use crate::core::errors::{WorkerError, WorkerResult};
pub use crate::core::types::{ContextId, WorkerId, WorkerState};
pub use monitoring::init_tracing;
pub use protocol::{Kwargs, Value};
pub use script::Session;
pub use worker::{list_all, Worker, WorkerBuilder, WorkerHandle};
