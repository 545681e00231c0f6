//! The lock coordinator: acquisition loop, renewal, release.
//!
//! One coordinator instance owns one store session for its entire life. The
//! record's existence in the store is the lock, so every transition goes
//! through a conditional write and exactly one coordinator can win each step.
//!
//! Lifecycle: `Unheld -> Acquiring -> Held -> Released`. Acquisition polls on
//! a fixed interval against a monotonic clock; renewal conditions on the
//! token captured at the last successful write; release is idempotent and
//! always closes the session.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, sleep};

use crate::config::LockConfig;
use crate::error::LockError;
use crate::model::{LockRecord, VersionToken, lock_id};
use crate::store::{DocumentSession, DocumentStore, StoreError};

/// Handle to a distributed lock held through a document store.
pub struct LockCoordinator<S: DocumentStore> {
    session: S::Session,
    name: String,
    id: String,
    /// Token of the record we own; `None` once lost or released.
    token: Option<VersionToken>,
    expires_at: DateTime<Utc>,
    released: bool,
}

impl<S: DocumentStore> std::fmt::Debug for LockCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("token", &self.token)
            .field("expires_at", &self.expires_at)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> LockCoordinator<S> {
    /// Acquire the lock named `name`, waiting up to `timeout`. On success the
    /// lease runs for `lifetime` until renewed.
    pub async fn acquire(
        store: &S,
        name: &str,
        timeout: Duration,
        lifetime: Duration,
    ) -> Result<Self, LockError> {
        Self::acquire_with(store, name, timeout, lifetime, LockConfig::default()).await
    }

    /// Acquire with explicit loop tuning.
    pub async fn acquire_with(
        store: &S,
        name: &str,
        timeout: Duration,
        lifetime: Duration,
        config: LockConfig,
    ) -> Result<Self, LockError> {
        let id = lock_id(name);
        let mut session = store.open_session().await?;

        match run_acquire_loop(&mut session, name, &id, timeout, lifetime, &config).await {
            Ok((token, expires_at)) => {
                tracing::debug!("acquired lock '{}' (lease until {})", name, expires_at);
                Ok(Self {
                    session,
                    name: name.to_string(),
                    id,
                    token: Some(token),
                    expires_at,
                    released: false,
                })
            }
            Err(e) => {
                // The session must not outlive a failed acquisition.
                let _ = session.close().await;
                Err(e)
            }
        }
    }

    /// Extend the lease to `lifetime` from now.
    ///
    /// Fails with [`LockError::LockLost`] when another coordinator has seized
    /// or reclaimed the record; the caller must then stop treating the
    /// protected work as exclusive.
    pub async fn renew(&mut self, lifetime: Duration) -> Result<(), LockError> {
        let Some(token) = self.token.clone() else {
            return Err(LockError::LockLost {
                name: self.name.clone(),
            });
        };

        let record = LockRecord::new(&self.id, lifetime);
        self.session.put(&self.id, &record, &token)?;
        match self.session.commit().await {
            Ok(()) => {
                self.token = Some(current_token(&self.session, &self.id)?);
                self.expires_at = record.expires_at;
                tracing::debug!("renewed lock '{}' (lease until {})", self.name, record.expires_at);
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                self.token = None;
                tracing::warn!("lock '{}' was seized by another coordinator", self.name);
                Err(LockError::LockLost {
                    name: self.name.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock and close the session.
    ///
    /// Safe to call more than once; only the first call performs store
    /// operations. The record being gone already (reclaimed as expired)
    /// counts as a successful release.
    pub async fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let deleted = match self.token.take() {
            Some(token) => self.delete_own_record(token).await,
            None => Ok(()),
        };
        // The session is closed no matter how the delete went.
        let closed = self.session.close().await;

        deleted?;
        closed?;
        tracing::debug!("released lock '{}'", self.name);
        Ok(())
    }

    async fn delete_own_record(&mut self, token: VersionToken) -> Result<(), LockError> {
        self.session.delete(&self.id, &token)?;
        match self.session.commit().await {
            Ok(()) => Ok(()),
            // Already reclaimed or seized; either way the record is no
            // longer ours to free.
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document id of the lock record.
    pub fn lock_id(&self) -> &str {
        &self.id
    }

    /// Whether this coordinator still believes it holds the lock.
    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }

    /// Lease expiry as of the last successful acquire or renew.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl<S: DocumentStore> Drop for LockCoordinator<S> {
    fn drop(&mut self) {
        // Backstop only: the async delete and close cannot run here. Callers
        // are expected to release() explicitly.
        if !self.released {
            tracing::warn!(
                "lock '{}' dropped without release; its record lingers until the lease expires",
                self.name
            );
        }
    }
}

async fn run_acquire_loop<T: DocumentSession>(
    session: &mut T,
    name: &str,
    id: &str,
    timeout: Duration,
    lifetime: Duration,
    config: &LockConfig,
) -> Result<(VersionToken, DateTime<Utc>), LockError> {
    let started = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(LockError::Timeout {
                name: name.to_string(),
                elapsed,
                timeout,
            });
        }

        let candidate = LockRecord::new(id, lifetime);
        session.put(id, &candidate, &VersionToken::absent())?;
        match session.commit().await {
            Ok(()) => {
                let token = current_token(session, id)?;
                return Ok((token, candidate.expires_at));
            }
            Err(e) if e.is_conflict() => {
                attempts += 1;
                tracing::debug!("lock '{}' contended (attempt {})", name, attempts);
                if attempts % config.reclaim_cadence() == 0 {
                    reclaim_if_expired(session, name, id).await?;
                }
            }
            Err(e) => return Err(e.into()),
        }

        sleep(config.poll_interval).await;
    }
}

/// Best-effort cleanup of a record left behind by a crashed holder. A
/// conflict here means another contender got to it first.
async fn reclaim_if_expired<T: DocumentSession>(
    session: &mut T,
    name: &str,
    id: &str,
) -> Result<(), LockError> {
    let Some(existing) = session.load(id).await? else {
        return Ok(());
    };
    if !existing.is_expired() {
        return Ok(());
    }
    let Some(token) = session.version_token(id) else {
        return Ok(());
    };

    session.delete(id, &token)?;
    match session.commit().await {
        Ok(()) => {
            tracing::debug!(
                "reclaimed abandoned lock '{}' (lease lapsed {})",
                name,
                existing.expires_at
            );
            Ok(())
        }
        Err(e) if e.is_conflict() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn current_token<T: DocumentSession>(session: &T, id: &str) -> Result<VersionToken, StoreError> {
    session.version_token(id).ok_or_else(|| StoreError::Unavailable {
        reason: format!("store reported no version token for '{}'", id),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::store::MemoryStore;

    async fn seed_record(store: &MemoryStore, id: &str, expires_at: DateTime<Utc>) {
        let mut session = store.open_session().await.unwrap();
        let record = LockRecord {
            id: id.to_string(),
            expires_at,
        };
        session.put(id, &record, &VersionToken::absent()).unwrap();
        session.commit().await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reclaim_skips_live_record() {
        let store = MemoryStore::new();
        let id = lock_id("live");
        seed_record(&store, &id, Utc::now() + TimeDelta::seconds(30)).await;

        let mut session = store.open_session().await.unwrap();
        reclaim_if_expired(&mut session, "live", &id).await.unwrap();
        assert!(store.contains(&id));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reclaim_removes_expired_record() {
        let store = MemoryStore::new();
        let id = lock_id("stale");
        seed_record(&store, &id, Utc::now() - TimeDelta::seconds(30)).await;

        let mut session = store.open_session().await.unwrap();
        reclaim_if_expired(&mut session, "stale", &id).await.unwrap();
        assert!(!store.contains(&id));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reclaim_of_missing_record_is_a_no_op() {
        let store = MemoryStore::new();
        let mut session = store.open_session().await.unwrap();
        reclaim_if_expired(&mut session, "ghost", &lock_id("ghost"))
            .await
            .unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_before_any_attempt() {
        let store = MemoryStore::new();
        let err = LockCoordinator::acquire(&store, "job", Duration::ZERO, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(!store.contains(&lock_id("job")));
        assert_eq!(store.open_sessions(), 0);
    }
}
