/*!
 * Isolate Types
 */

use crate::core::types::ContextId;
use crate::script::{ErrorKind, ScriptError};
use miette::Diagnostic;
use thiserror::Error;

pub type IsolateResult<T> = Result<T, IsolateError>;

/// Errors reported by an isolation primitive
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum IsolateError {
    #[error("Unknown execution context {0}")]
    #[diagnostic(code(isolate::unknown_context))]
    UnknownContext(ContextId),

    #[error("Execution context {0} is running")]
    #[diagnostic(
        code(isolate::running),
        help("A context runs one piece of code at a time and cannot be destroyed mid-run.")
    )]
    Running(ContextId),

    #[error("Code failed in context {context}: {kind}: {message}")]
    #[diagnostic(code(isolate::run_failed))]
    RunFailed {
        context: ContextId,
        kind: ErrorKind,
        message: String,
    },

    #[error("Live context limit of {limit} reached")]
    #[diagnostic(
        code(isolate::exhausted),
        help("Close idle workers to release their execution contexts.")
    )]
    Exhausted { limit: usize },
}

impl IsolateError {
    pub fn run_failed(context: ContextId, error: ScriptError) -> Self {
        IsolateError::RunFailed {
            context,
            kind: error.kind,
            message: error.message,
        }
    }
}
