//! Storage infrastructure: configuration file and install identity.
//!
//! - `config` reads and writes the TOML settings file from the platform
//!   config directory, falling back to defaults on first run.
//! - `identity` owns the per-installation id sent to the receiver in
//!   `login`, created once and kept next to the config file.

pub mod config;
pub mod identity;
