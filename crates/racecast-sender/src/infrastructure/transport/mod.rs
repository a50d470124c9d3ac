//! Transport implementations.
//!
//! - `mock` records every call and lets tests play the device's side.
//! - `simulated` answers like a receiver running the race application, for
//!   running the sender without a device.

pub mod mock;
pub mod simulated;
