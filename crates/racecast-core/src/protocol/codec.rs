//! JSON codec for Racecast protocol messages.
//!
//! Wire format: one UTF-8 JSON object per message, snake_case field names,
//! discriminated by a string `"type"` field:
//!
//! ```text
//! {"type":"<discriminant>", <variant fields…>}
//! ```
//!
//! Decoding is total over well-formed JSON objects that carry a string
//! `"type"`: discriminants this version does not know become
//! [`Message::Unknown`] instead of an error, so one newer message cannot take
//! down a whole channel. Extra fields are ignored.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::protocol::messages::{Message, MessageType};

/// Name of the discriminant field.
pub const TYPE_FIELD: &str = "type";

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// The bytes are not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// The payload parsed, but it is not a JSON object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// The object has no string `"type"` field.
    #[error("missing or non-string \"type\" discriminant")]
    MissingType,

    /// A known discriminant whose fields do not match the variant.
    #[error("invalid {message_type} payload: {reason}")]
    InvalidPayload {
        message_type: &'static str,
        reason: String,
    },

    /// A builder was finished before a required field was set.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Serialization failed.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into its JSON wire form.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use racecast_core::protocol::{decode_message, encode_message};
/// use racecast_core::protocol::messages::{LoginMessage, Message};
///
/// let msg = Message::Login(LoginMessage::new("install-1"));
/// let json = encode_message(&msg).unwrap();
/// assert_eq!(json, r#"{"type":"login","id":"install-1"}"#);
/// assert_eq!(decode_message(&json).unwrap(), msg);
/// ```
pub fn encode_message(msg: &Message) -> Result<String, CodecError> {
    match msg {
        Message::Unknown(type_name) => {
            let mut object = serde_json::Map::new();
            object.insert(TYPE_FIELD.to_string(), Value::String(type_name.clone()));
            Ok(Value::Object(object).to_string())
        }
        known => serde_json::to_string(known).map_err(|e| CodecError::Encode(e.to_string())),
    }
}

/// Decodes one [`Message`] from a JSON payload.
///
/// # Errors
///
/// Returns [`CodecError`] for malformed JSON, a non-object payload, a missing
/// `"type"`, or a known variant whose fields do not fit.
///
/// # Examples
///
/// ```rust
/// use racecast_core::protocol::decode_message;
/// use racecast_core::protocol::messages::Message;
///
/// let msg = decode_message(r#"{"type":"player_count","count":3}"#).unwrap();
/// assert_eq!(msg, Message::Unknown("player_count".to_string()));
/// ```
pub fn decode_message(payload: &str) -> Result<Message, CodecError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| CodecError::MalformedJson(e.to_string()))?;
    decode_value(value)
}

/// Decodes one [`Message`] from an already-parsed JSON value.
///
/// # Errors
///
/// Same as [`decode_message`], minus [`CodecError::MalformedJson`].
pub fn decode_value(value: Value) -> Result<Message, CodecError> {
    let type_name = match &value {
        Value::Object(object) => object
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingType)?
            .to_string(),
        _ => return Err(CodecError::NotAnObject),
    };

    let message_type = match MessageType::try_from(type_name.as_str()) {
        Ok(t) => t,
        Err(()) => {
            warn!("received message of unknown type {type_name:?}");
            return Ok(Message::Unknown(type_name));
        }
    };

    serde_json::from_value(value).map_err(|e| CodecError::InvalidPayload {
        message_type: message_type.as_str(),
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
