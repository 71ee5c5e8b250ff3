/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use crate::core::types::{ContextId, WorkerId, WorkerState};
use miette::Diagnostic;
use thiserror::Error;

pub use crate::channel::ChannelError;
pub use crate::config::ConfigError;
pub use crate::isolate::IsolateError;
pub use crate::protocol::CodecError;
pub use crate::script::{ErrorKind, ScriptError};

/// Unified worker error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum WorkerError {
    #[error("Worker {worker} already started (state: {state})")]
    #[diagnostic(
        code(worker::already_started),
        help("A worker can be started once. Create a new worker instead of restarting a used one.")
    )]
    AlreadyStarted { worker: WorkerId, state: WorkerState },

    #[error("Worker {0} not started")]
    #[diagnostic(
        code(worker::not_started),
        help("Call `start()` before issuing calls.")
    )]
    NotStarted(WorkerId),

    #[error("Worker {0} is closed")]
    #[diagnostic(code(worker::closed), help("Closed workers cannot run calls."))]
    Closed(WorkerId),

    #[error("Execution context {0} is running")]
    #[diagnostic(
        code(worker::context_running),
        help("Wait for the in-flight call to finish (`done()`/`result()`) before closing.")
    )]
    ContextRunning(ContextId),

    #[error("Worker {0} already has a call in flight")]
    #[diagnostic(
        code(worker::busy),
        help("One worker runs one call at a time. Retrieve the pending result or use another worker.")
    )]
    Busy(WorkerId),

    #[error("Invalid state: {0}")]
    #[diagnostic(code(worker::invalid_state))]
    InvalidState(String),

    #[error("Payload of {size} bytes does not fit the payload region of {capacity} bytes; call cancelled")]
    #[diagnostic(
        code(worker::payload_too_large),
        help("Pass smaller arguments or configure a larger return offset.")
    )]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error("Cannot serialize request: {0}")]
    #[diagnostic(code(worker::unserializable))]
    Unserializable(String),

    #[error("Remote execution failed for {callable}(*{args}): {message}")]
    #[diagnostic(
        code(worker::remote_execution),
        help("The receiving routine in the worker failed. The worker may need to be recreated.")
    )]
    RemoteExecution {
        callable: String,
        args: String,
        message: String,
    },

    #[error("{callable} raised {kind}: {message}")]
    #[diagnostic(code(worker::remote))]
    Remote {
        callable: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("Replication of '{symbol}' failed: {reason}")]
    #[diagnostic(
        code(worker::replication_failed),
        help("The callable's own source could not be evaluated inside the worker.")
    )]
    ReplicationFailed { symbol: String, reason: String },

    #[error("Failed to decode result: {0}")]
    #[diagnostic(code(worker::decode))]
    Decode(CodecError),

    #[error("Channel error: {0}")]
    #[diagnostic(transparent)]
    Channel(#[from] ChannelError),

    #[error("Isolate error: {0}")]
    #[diagnostic(transparent)]
    Isolate(#[from] IsolateError),

    #[error("Configuration error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Script error: {0}")]
    #[diagnostic(transparent)]
    Script(#[from] ScriptError),

    #[error("Call thread failed: {0}")]
    #[diagnostic(code(worker::thread))]
    Thread(String),
}

impl From<CodecError> for WorkerError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::PayloadTooLarge { size, capacity } => {
                WorkerError::PayloadTooLarge { size, capacity }
            }
            CodecError::Unserializable(msg) => WorkerError::Unserializable(msg),
            CodecError::Serialize { what, source } => {
                WorkerError::Unserializable(format!("{}: {}", what, source))
            }
            other => WorkerError::Decode(other),
        }
    }
}

/// Result type for worker operations
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;
