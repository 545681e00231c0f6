//! Error taxonomy for lock operations.

use std::time::Duration;

use crate::store::StoreError;

/// Errors surfaced by a [`LockCoordinator`](crate::LockCoordinator).
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The acquisition window elapsed without winning the lock.
    #[error("timed out acquiring lock '{name}' after {elapsed:?} (timeout {timeout:?})")]
    Timeout {
        name: String,
        elapsed: Duration,
        timeout: Duration,
    },

    /// A renewal conflict proved another coordinator seized or reclaimed the
    /// lock; the caller must no longer assume exclusivity.
    #[error("lock '{name}' is no longer held by this coordinator")]
    LockLost { name: String },

    /// Store-level failure; never retried internally.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_lock_lost(&self) -> bool {
        matches!(self, Self::LockLost { .. })
    }
}
