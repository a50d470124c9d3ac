//! Domain types for Racecast.
//!
//! Pure data with no I/O: which receiver is selected, what state the session
//! is in, and how sessions are told apart.  The sender's application layer
//! builds its state machine on top of these types.

pub mod device;
pub mod session;
pub mod status;

pub use device::{Device, DeviceId};
pub use session::{SessionCounter, SessionId};
pub use status::ConnectionStatus;
