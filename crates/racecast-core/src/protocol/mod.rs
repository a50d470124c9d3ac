//! Protocol module containing message types and the JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_message, decode_value, encode_message, CodecError};
pub use messages::*;
