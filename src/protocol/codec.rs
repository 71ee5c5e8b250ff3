/*!
 * Wire Codec
 * bincode encoding shared byte-for-byte by controller and worker
 *
 * # Layout
 * - Request: `CallableRef`, `Vec<Value>`, `Kwargs` back to back at payload offset 0
 * - Response: flag byte, then one `Outcome`
 *
 * Each object carries its own boundaries, so decoding reads sequentially
 * from one cursor with no outer length framing.
 */

use super::message::{CallableRef, Outcome, Request};
use super::value::{Kwargs, Value};
use crate::channel::CompletionFlag;
use bincode::Options;
use miette::Diagnostic;
use serde::Serialize;
use std::io::Read;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Encoding and decoding errors
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum CodecError {
    #[error("Serialization of {what} failed: {source}")]
    #[diagnostic(code(codec::serialize))]
    Serialize {
        what: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("Deserialization of {what} failed: {source}")]
    #[diagnostic(code(codec::deserialize))]
    Deserialize {
        what: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("Encoded size {size} does not fit region capacity {capacity}")]
    #[diagnostic(code(codec::too_large))]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error("Object cannot be sent: {0}")]
    #[diagnostic(code(codec::unserializable))]
    Unserializable(String),

    #[error("Corrupt region: {0}")]
    #[diagnostic(code(codec::corrupt))]
    Corrupt(String),
}

// ============================================================================
// Wire Options
// ============================================================================

/// Options used by both ends; `limit` bounds how much a decode may consume
#[inline]
fn wire(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit as u64)
}

fn serialize_into<T: Serialize + ?Sized>(
    buf: &mut Vec<u8>,
    value: &T,
    what: &'static str,
) -> CodecResult<()> {
    wire(usize::MAX)
        .serialize_into(&mut *buf, value)
        .map_err(|source| CodecError::Serialize { what, source })
}

// ============================================================================
// Requests
// ============================================================================

/// Encode a request; fails without side effects if it would not fit
/// strictly inside `capacity` bytes
pub fn encode_request(
    callable: &CallableRef,
    args: &[Value],
    kwargs: &Kwargs,
    capacity: usize,
) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(256);
    serialize_into(&mut buf, callable, "callable")?;
    serialize_into(&mut buf, args, "positional arguments")?;
    serialize_into(&mut buf, kwargs, "keyword arguments")?;

    if buf.len() >= capacity {
        return Err(CodecError::PayloadTooLarge {
            size: buf.len(),
            capacity,
        });
    }
    Ok(buf)
}

/// Decode the three request objects sequentially from `reader`
pub fn decode_request<R: Read>(mut reader: R, limit: usize) -> CodecResult<Request> {
    let callable: CallableRef = wire(limit)
        .deserialize_from(&mut reader)
        .map_err(|source| CodecError::Deserialize {
            what: "callable",
            source,
        })?;
    let args: Vec<Value> = wire(limit)
        .deserialize_from(&mut reader)
        .map_err(|source| CodecError::Deserialize {
            what: "positional arguments",
            source,
        })?;
    let kwargs: Kwargs = wire(limit)
        .deserialize_from(&mut reader)
        .map_err(|source| CodecError::Deserialize {
            what: "keyword arguments",
            source,
        })?;
    Ok(Request {
        callable,
        args,
        kwargs,
    })
}

// ============================================================================
// Outcomes
// ============================================================================

/// Flag value announcing `outcome`
#[inline]
pub fn flag_for(outcome: &Outcome) -> CompletionFlag {
    match outcome {
        Outcome::Return(_) => CompletionFlag::Value,
        Outcome::Raised(_) => CompletionFlag::Raised,
    }
}

pub fn encode_outcome(outcome: &Outcome, capacity: usize) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    serialize_into(&mut buf, outcome, "outcome")?;
    if buf.len() > capacity {
        return Err(CodecError::PayloadTooLarge {
            size: buf.len(),
            capacity,
        });
    }
    Ok(buf)
}

pub fn decode_outcome<R: Read>(mut reader: R, limit: usize) -> CodecResult<Outcome> {
    wire(limit)
        .deserialize_from(&mut reader)
        .map_err(|source| CodecError::Deserialize {
            what: "outcome",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RemoteError;
    use crate::script::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn sqrt_ref() -> CallableRef {
        CallableRef::Qualified {
            module: "math".into(),
            name: "sqrt".into(),
        }
    }

    #[test]
    fn test_request_objects_decode_sequentially() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("reverse".into(), Value::Bool(true));
        let bytes = encode_request(&sqrt_ref(), &[Value::from(16)], &kwargs, 1024).unwrap();

        // Trailing garbage after the third object is ignored
        let mut padded = bytes.clone();
        padded.extend_from_slice(&[0xAB; 32]);

        let request = decode_request(Cursor::new(padded), 1024).unwrap();
        assert_eq!(request.callable, sqrt_ref());
        assert_eq!(request.args, vec![Value::from(16)]);
        assert_eq!(request.kwargs, kwargs);
    }

    #[test]
    fn test_request_must_fit_strictly() {
        let exact = encode_request(&sqrt_ref(), &[], &Kwargs::new(), 4096)
            .unwrap()
            .len();
        assert!(matches!(
            encode_request(&sqrt_ref(), &[], &Kwargs::new(), exact),
            Err(CodecError::PayloadTooLarge { size, capacity }) if size == exact && capacity == exact
        ));
        assert!(encode_request(&sqrt_ref(), &[], &Kwargs::new(), exact + 1).is_ok());
    }

    #[test]
    fn test_truncated_request_is_error() {
        let bytes = encode_request(&sqrt_ref(), &[Value::from("abc")], &Kwargs::new(), 1024)
            .unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            decode_request(Cursor::new(truncated), 1024),
            Err(CodecError::Deserialize { .. })
        ));
    }

    #[test]
    fn test_zeroed_region_is_not_a_request() {
        // Zero bytes decode the callable variant and empty strings, then the
        // args length; an all-zero region must never yield a usable call.
        let zeros = vec![0u8; 64];
        match decode_request(Cursor::new(zeros), 64) {
            Ok(request) => assert_eq!(
                request.callable,
                CallableRef::Qualified {
                    module: String::new(),
                    name: String::new()
                }
            ),
            Err(e) => assert!(matches!(e, CodecError::Deserialize { .. })),
        }
    }

    #[test]
    fn test_outcome_flags() {
        let raised = Outcome::Raised(RemoteError {
            kind: ErrorKind::ValueError,
            message: "bad".into(),
        });
        assert_eq!(flag_for(&raised), CompletionFlag::Raised);
        assert_eq!(
            flag_for(&Outcome::Return(Value::None)),
            CompletionFlag::Value
        );

        let bytes = encode_outcome(&raised, 128).unwrap();
        assert_eq!(decode_outcome(Cursor::new(bytes), 128).unwrap(), raised);
    }

    #[test]
    fn test_outcome_capacity() {
        let big = Outcome::Return(Value::Str("x".repeat(100)));
        assert!(matches!(
            encode_outcome(&big, 50),
            Err(CodecError::PayloadTooLarge { capacity: 50, .. })
        ));
    }

    #[test]
    fn test_decode_limit_rejects_oversized_lengths() {
        let bytes = encode_outcome(&Outcome::Return(Value::Str("y".repeat(500))), 4096).unwrap();
        assert!(decode_outcome(Cursor::new(bytes), 100).is_err());
    }
}
