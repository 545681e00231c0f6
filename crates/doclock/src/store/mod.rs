//! The document store collaborator.
//!
//! The coordinator treats the store as a black box offering conditional
//! writes with version comparison. [`DocumentSession::put`] and
//! [`DocumentSession::delete`] stage work locally; [`DocumentSession::commit`]
//! flushes it over the network and is where version conflicts surface.

mod memory;

pub use memory::{MemorySession, MemoryStore};

use async_trait::async_trait;

use crate::model::{LockRecord, VersionToken};

/// Store-level errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The server's current version of the document did not match the
    /// expected token. Ordinary contention, not an infrastructure fault.
    #[error("version conflict on document '{id}'")]
    VersionConflict { id: String },

    /// The store could not be reached or refused the operation.
    #[error("document store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The document body could not be encoded or decoded.
    #[error("codec failure on document '{id}'")]
    Codec {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether this is the contention case a retry loop may absorb.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// A document store able to host lock records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    type Session: DocumentSession;

    /// Open a fresh session. One session serves a lock instance for its
    /// entire life.
    async fn open_session(&self) -> Result<Self::Session, StoreError>;
}

/// A unit-of-work session against the store.
#[async_trait]
pub trait DocumentSession: Send {
    /// Stage a conditional write of `record` at `id`, applied only if the
    /// server's version still matches `expected`. The absent token means the
    /// document must not exist yet.
    fn put(
        &mut self,
        id: &str,
        record: &LockRecord,
        expected: &VersionToken,
    ) -> Result<(), StoreError>;

    /// Stage a conditional delete of `id`. Deleting a document that is
    /// already gone commits successfully.
    fn delete(&mut self, id: &str, expected: &VersionToken) -> Result<(), StoreError>;

    /// Flush staged operations over the network. Raises
    /// [`StoreError::VersionConflict`] when a condition no longer holds.
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Load the current record at `id`, tracking its server version in the
    /// session.
    async fn load(&mut self, id: &str) -> Result<Option<LockRecord>, StoreError>;

    /// The version token last observed for `id` within this session.
    fn version_token(&self, id: &str) -> Option<VersionToken>;

    /// Close the session; no further operations are valid afterwards.
    async fn close(&mut self) -> Result<(), StoreError>;
}
