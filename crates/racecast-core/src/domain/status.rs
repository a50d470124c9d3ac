//! Connection status of the sender's single receiver session.
//!
//! ```text
//!                 select_device(Some)        connect()
//!  NotAvailable ───────────────────► Disconnected ─────► Connecting
//!       ▲                                 ▲                  │ transport up
//!       │ select_device(None)             │ failed /         ▼
//!       │ or device replaced              │ disconnect()  Connected ◄─┐
//!       │                                 │                  │        │ transport
//!       └──── from any state              │  launch success  ▼        │ back up
//!                                         └──────────────── Casting   │
//!                                                 suspended ─► Suspended
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current state of the sender's connection to its selected receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No device selected.
    #[default]
    NotAvailable,
    /// A device is selected but the transport is down.
    Disconnected,
    /// Transport connect requested, waiting for the result.
    Connecting,
    /// Transport is up; the receiver application is not (yet) running.
    Connected,
    /// Transport dropped temporarily and may come back on its own.
    Suspended,
    /// Receiver application is running and the player is logged in.
    Casting,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::NotAvailable => "NOT_AVAILABLE",
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Suspended => "SUSPENDED",
            ConnectionStatus::Casting => "CASTING",
        }
    }

    /// `true` while the transport link is believed to be up.
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Casting)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
