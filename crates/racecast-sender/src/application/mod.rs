//! Application layer of the sender.
//!
//! Owns the session state machine and everything it coordinates.  Code here
//! talks to devices only through the traits in [`transport`]; concrete
//! transports, files and UI plumbing live in `infrastructure`.
//!
//! - **`connection_manager`** – The single-session lifecycle: device
//!   selection, connect/disconnect, application launch and login, and the
//!   entry point for every transport event.
//!
//! - **`channel_mux`** – One transport subscription per namespace, fanned out
//!   to any number of local message handlers.
//!
//! - **`listener_registry`** – Ordered, deduplicated status listeners.
//!
//! - **`transport`** – `Transport`, `TransportFactory` and
//!   `IdentityProvider` traits plus the event types transports emit.

pub mod channel_mux;
pub mod connection_manager;
pub mod listener_registry;
pub mod transport;
