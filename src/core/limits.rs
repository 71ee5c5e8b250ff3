/*!
 * System Limits and Constants
 *
 * Channel geometry, completion flag values and evaluation limits.
 * Both sides of a channel must agree on every value in this file.
 */

use std::time::Duration;

// =============================================================================
// CHANNEL GEOMETRY
// =============================================================================

/// Total size of a worker channel (10MB)
/// The backing file is created zero-filled at exactly this length
pub const BFSZ: usize = 10_000_000;

/// Offset where the return region starts (8MB)
/// Everything below is the payload region written by the controller
pub const RET_OFFSET: usize = 8_000_000;

/// Bytes available for an encoded request
pub const PAYLOAD_CAPACITY: usize = RET_OFFSET;

/// Bytes available for the completion flag plus the encoded outcome
pub const RETURN_CAPACITY: usize = BFSZ - RET_OFFSET;

/// Smallest channel a configuration may ask for
pub const MIN_BUFFER_SIZE: usize = 64;

/// Smallest return region a configuration may ask for (flag + a small outcome)
pub const MIN_RETURN_REGION: usize = 16;

// =============================================================================
// COMPLETION FLAG
// =============================================================================

/// No result written yet
pub const FLAG_PENDING: u8 = 0;

/// A return value follows the flag byte
pub const FLAG_VALUE: u8 = 1;

/// A remote error marker follows the flag byte
pub const FLAG_RAISED: u8 = 2;

/// The trigger failed; set by the controller, nothing follows
pub const FLAG_TRIGGER_FAILED: u8 = 3;

// =============================================================================
// ISOLATES
// =============================================================================

/// Maximum number of live contexts in one `LocalIsolates` backend
pub const MAX_LIVE_CONTEXTS: usize = 128;

/// Maximum nesting of script function calls before a RecursionError
pub const MAX_CALL_DEPTH: usize = 256;

/// Largest list `range()` will materialize
pub const MAX_RANGE_LEN: usize = 10_000_000;

// =============================================================================
// DISPATCH
// =============================================================================

/// Default sleep between completion polls in `wait()`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Calls slower than this are reported at warn level
pub const SLOW_CALL_THRESHOLD: Duration = Duration::from_millis(250);

/// Stack of a threaded call; deep script recursion runs on it
pub const CALL_THREAD_STACK_SIZE: usize = 256 * 1024 * 1024;
