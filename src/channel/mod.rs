/*!
 * Shared Channel
 * Fixed-size memory-mapped buffer split into a payload and a return region
 */

pub mod cursor;
pub mod mapping;
pub mod shared;
pub mod types;

// Re-export public API
pub use cursor::RegionCursor;
pub use mapping::SharedMapping;
pub use shared::Channel;
pub use types::{ChannelError, CompletionFlag};
