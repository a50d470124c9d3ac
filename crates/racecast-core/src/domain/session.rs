//! Session identifiers.
//!
//! Every transport session the sender opens gets a fresh [`SessionId`] from a
//! [`SessionCounter`].  Transport callbacks carry the id of the session that
//! produced them, so a callback from a session that has since been torn down
//! (for example a late "connected" after the user switched devices) can be
//! recognised and dropped.
//!
//! The counter is atomic so a single counter can be shared between threads,
//! but the ids only need to be unique and increasing, not dense.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifies one transport session.  Ids are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// A thread-safe, monotonically increasing source of [`SessionId`]s.
///
/// The first id handed out is `1`.
///
/// # Examples
///
/// ```rust
/// use racecast_core::domain::session::SessionCounter;
///
/// let counter = SessionCounter::new();
/// let a = counter.next();
/// let b = counter.next();
/// assert!(b > a);
/// ```
pub struct SessionCounter {
    inner: AtomicU64,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns a fresh id and advances the counter.
    ///
    /// `Relaxed` is enough: ids are compared for equality, never used to
    /// order memory accesses.
    pub fn next(&self) -> SessionId {
        SessionId(self.inner.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionCounter {
    fn default() -> Self {
        Self::new()
    }
}
