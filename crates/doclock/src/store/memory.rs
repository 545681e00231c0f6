//! In-memory document store backend.
//!
//! Backs tests and single-process embedding. Conditional commits are atomic
//! per key through the `DashMap` entry API; every successful write assigns a
//! fresh uuid etag as the document's version token.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{DocumentSession, DocumentStore, StoreError};
use crate::model::{LockRecord, VersionToken};

#[derive(Debug, Clone)]
struct VersionedDocument {
    body: serde_json::Value,
    etag: String,
}

/// Shared in-memory store. Cheap to clone; all clones see the same documents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    documents: DashMap<String, VersionedDocument>,
    offline: AtomicBool,
    open_sessions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage; session operations fail until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// Whether a document currently exists at `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.documents.contains_key(id)
    }
}

impl StoreInner {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "store offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    type Session = MemorySession;

    async fn open_session(&self) -> Result<MemorySession, StoreError> {
        self.inner.check_online()?;
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            inner: self.inner.clone(),
            tracked: HashMap::new(),
            pending: Vec::new(),
            closed: false,
        })
    }
}

#[derive(Debug)]
enum PendingOp {
    Put {
        id: String,
        body: serde_json::Value,
        expected: VersionToken,
    },
    Delete {
        id: String,
        expected: VersionToken,
    },
}

/// Unit-of-work session over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySession {
    inner: Arc<StoreInner>,
    /// Last server version observed per document id.
    tracked: HashMap<String, VersionToken>,
    pending: Vec<PendingOp>,
    closed: bool,
}

impl MemorySession {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Unavailable {
                reason: "session closed".to_string(),
            });
        }
        Ok(())
    }

    fn apply(&mut self, op: PendingOp) -> Result<(), StoreError> {
        match op {
            PendingOp::Put { id, body, expected } => {
                let etag = Uuid::new_v4().to_string();
                match self.inner.documents.entry(id.clone()) {
                    Entry::Occupied(mut occupied) => {
                        if expected.as_str() != Some(occupied.get().etag.as_str()) {
                            return Err(StoreError::VersionConflict { id });
                        }
                        occupied.insert(VersionedDocument {
                            body,
                            etag: etag.clone(),
                        });
                    }
                    Entry::Vacant(vacant) => {
                        if !expected.is_absent() {
                            return Err(StoreError::VersionConflict { id });
                        }
                        vacant.insert(VersionedDocument {
                            body,
                            etag: etag.clone(),
                        });
                    }
                }
                self.tracked.insert(id, VersionToken::new(etag));
                Ok(())
            }
            PendingOp::Delete { id, expected } => {
                match self.inner.documents.entry(id.clone()) {
                    Entry::Occupied(occupied) => {
                        if expected.as_str() != Some(occupied.get().etag.as_str()) {
                            return Err(StoreError::VersionConflict { id });
                        }
                        occupied.remove();
                    }
                    // The document is already gone; a delete of an absent
                    // document is a no-op.
                    Entry::Vacant(_) => {}
                }
                self.tracked.remove(&id);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DocumentSession for MemorySession {
    fn put(
        &mut self,
        id: &str,
        record: &LockRecord,
        expected: &VersionToken,
    ) -> Result<(), StoreError> {
        self.check_open()?;
        let body = serde_json::to_value(record).map_err(|source| StoreError::Codec {
            id: id.to_string(),
            source,
        })?;
        self.pending.push(PendingOp::Put {
            id: id.to_string(),
            body,
            expected: expected.clone(),
        });
        Ok(())
    }

    fn delete(&mut self, id: &str, expected: &VersionToken) -> Result<(), StoreError> {
        self.check_open()?;
        self.pending.push(PendingOp::Delete {
            id: id.to_string(),
            expected: expected.clone(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.check_open()?;
        self.inner.check_online()?;
        // A failed condition discards the remaining staged work, the way a
        // unit-of-work session is thrown away after a conflicted flush.
        let ops = std::mem::take(&mut self.pending);
        for op in ops {
            self.apply(op)?;
        }
        Ok(())
    }

    async fn load(&mut self, id: &str) -> Result<Option<LockRecord>, StoreError> {
        self.check_open()?;
        self.inner.check_online()?;
        let Some(doc) = self.inner.documents.get(id).map(|d| d.value().clone()) else {
            self.tracked.remove(id);
            return Ok(None);
        };
        let record = serde_json::from_value(doc.body).map_err(|source| StoreError::Codec {
            id: id.to_string(),
            source,
        })?;
        self.tracked.insert(id.to_string(), VersionToken::new(doc.etag));
        Ok(Some(record))
    }

    fn version_token(&self, id: &str) -> Option<VersionToken> {
        self.tracked.get(id).cloned()
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if !self.closed {
            self.closed = true;
            self.pending.clear();
            self.tracked.clear();
            self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
