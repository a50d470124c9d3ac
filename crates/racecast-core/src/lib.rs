//! # racecast-core
//!
//! Shared library for the Racecast sender: the JSON message protocol spoken
//! with the receiver application, and the domain types the sender's session
//! controller is built from.
//!
//! It performs no I/O and depends on no transport.
//!
//! - **`protocol`** – Typed messages (`login`, `request`, `game_state`, …) and
//!   the codec that turns them into the tagged JSON objects sent over a
//!   namespace and back.
//!
//! - **`domain`** – [`Device`], [`ConnectionStatus`] and [`SessionId`].

pub mod domain;
pub mod protocol;

pub use domain::{ConnectionStatus, Device, DeviceId, SessionCounter, SessionId};
pub use protocol::codec::{decode_message, encode_message, CodecError};
pub use protocol::messages::Message;
