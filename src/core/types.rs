/*!
 * Core Types
 * Common types used across the crate
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier handed out by the isolation primitive for one execution context
pub type ContextId = u64;

/// Process-local serial number of a worker handle
pub type WorkerId = u64;

/// Lifecycle state of a worker
///
/// ```text
/// Unstarted -> Started -> CallInFlight -> Done -> CallInFlight -> ...
///                  \__________________________\-> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Unstarted,
    Started,
    CallInFlight,
    Done,
    Closed,
}

impl WorkerState {
    /// A call may be issued from this state
    #[inline]
    pub fn accepts_calls(self) -> bool {
        matches!(self, WorkerState::Started | WorkerState::Done)
    }

    /// Context and channel are allocated
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(
            self,
            WorkerState::Started | WorkerState::CallInFlight | WorkerState::Done
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Unstarted => "unstarted",
            WorkerState::Started => "started",
            WorkerState::CallInFlight => "call in flight",
            WorkerState::Done => "done",
            WorkerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_calls() {
        assert!(!WorkerState::Unstarted.accepts_calls());
        assert!(WorkerState::Started.accepts_calls());
        assert!(!WorkerState::CallInFlight.accepts_calls());
        assert!(WorkerState::Done.accepts_calls());
        assert!(!WorkerState::Closed.accepts_calls());
    }

    #[test]
    fn test_is_open() {
        assert!(WorkerState::CallInFlight.is_open());
        assert!(!WorkerState::Closed.is_open());
        assert!(!WorkerState::Unstarted.is_open());
    }
}
