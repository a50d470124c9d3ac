//! Infrastructure layer for the sender.
//!
//! Contains adapters: transports, file-system storage, and the UI command
//! bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `racecast_core`.  Non-test code in `application` MUST NOT import it; its
//! unit tests may use the recording transport in `transport::mock`.

pub mod storage;
pub mod transport;
pub mod ui_bridge;
