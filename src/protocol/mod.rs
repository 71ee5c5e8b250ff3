/*!
 * Serialization Protocol
 * Values, callable references and the bincode wire format
 */

pub mod codec;
pub mod message;
pub mod value;

// Re-export public API
pub use codec::{
    decode_outcome, decode_request, encode_outcome, encode_request, flag_for, CodecError,
    CodecResult,
};
pub use message::{render_args, CallableRef, Outcome, RemoteError, Request};
pub use value::{Kwargs, Value};
