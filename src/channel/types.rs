/*!
 * Channel Types
 * Errors and the completion flag shared by both ends of a channel
 */

use crate::core::limits::{FLAG_PENDING, FLAG_RAISED, FLAG_TRIGGER_FAILED, FLAG_VALUE};
use miette::Diagnostic;
use thiserror::Error;

/// Channel error types
#[derive(Error, Debug, Diagnostic)]
pub enum ChannelError {
    /// Offset or size outside the mapping
    #[error("Invalid offset or size: offset {offset}, size {size}, buffer size {buffer_size}")]
    #[diagnostic(code(channel::out_of_range))]
    OutOfRange {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    #[error("Cannot map an empty buffer")]
    #[diagnostic(code(channel::empty))]
    Empty,

    #[error("Backing file error: {0}")]
    #[diagnostic(
        code(channel::backing_file),
        help("Check that the backing directory exists, is writable and has room for the buffer.")
    )]
    Backing(#[from] std::io::Error),

    #[error("mmap failed: {0}")]
    #[diagnostic(code(channel::map))]
    Map(nix::Error),

    #[error("munmap failed: {0}")]
    #[diagnostic(code(channel::unmap))]
    Unmap(nix::Error),
}

/// State encoded in the first byte of the return region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFlag {
    /// No result yet
    Pending,
    /// A return value follows
    Value,
    /// A remote error marker follows
    Raised,
    /// The trigger failed before a result was written
    TriggerFailed,
    /// Anything else: the region is corrupt
    Unknown(u8),
}

impl CompletionFlag {
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            FLAG_PENDING => CompletionFlag::Pending,
            FLAG_VALUE => CompletionFlag::Value,
            FLAG_RAISED => CompletionFlag::Raised,
            FLAG_TRIGGER_FAILED => CompletionFlag::TriggerFailed,
            other => CompletionFlag::Unknown(other),
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        match self {
            CompletionFlag::Pending => FLAG_PENDING,
            CompletionFlag::Value => FLAG_VALUE,
            CompletionFlag::Raised => FLAG_RAISED,
            CompletionFlag::TriggerFailed => FLAG_TRIGGER_FAILED,
            CompletionFlag::Unknown(byte) => byte,
        }
    }

    /// Nonzero flag: something was written
    #[inline]
    pub fn is_set(self) -> bool {
        self != CompletionFlag::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bytes() {
        for flag in [
            CompletionFlag::Pending,
            CompletionFlag::Value,
            CompletionFlag::Raised,
            CompletionFlag::TriggerFailed,
        ] {
            assert_eq!(CompletionFlag::from_byte(flag.to_byte()), flag);
        }
        assert_eq!(CompletionFlag::from_byte(200), CompletionFlag::Unknown(200));
        assert!(CompletionFlag::Unknown(200).is_set());
        assert!(!CompletionFlag::Pending.is_set());
    }
}
