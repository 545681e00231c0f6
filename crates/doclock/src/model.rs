//! Lock record data model and version-token handling.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Key prefix for lock documents in the store.
pub const LOCK_ID_PREFIX: &str = "locks/";

/// Derive the deterministic document id for a lock name.
pub fn lock_id(name: &str) -> String {
    format!("{}{}", LOCK_ID_PREFIX, name)
}

/// Opaque version marker assigned by the store on every successful write.
///
/// A conditional write asserts "I am updating exactly the version I last
/// observed". The absent token asserts that the document must not currently
/// exist, which is what makes the initial create exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionToken(Option<String>);

impl VersionToken {
    /// The token asserting "the document must not currently exist".
    pub const fn absent() -> Self {
        Self(None)
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(Some(raw.into()))
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Durable lock record; its existence in the store is the lock.
///
/// The version token is deliberately not part of the body. It is metadata
/// assigned by the store on each write and tracked by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Document id (`locks/` + lock name).
    pub id: String,
    /// Absolute UTC timestamp beyond which the lock counts as abandoned.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// Build a candidate record whose lease runs for `lifetime` from now.
    pub fn new(id: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            id: id.into(),
            expires_at: expiry_after(lifetime),
        }
    }

    /// Whether the lease has lapsed and the record may be reclaimed.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

fn expiry_after(lifetime: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(lifetime).unwrap_or(TimeDelta::MAX);
    Utc::now()
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_id_derivation() {
        assert_eq!(lock_id("batch-job"), "locks/batch-job");
        assert_eq!(lock_id("batch-job"), lock_id("batch-job"));
        assert_ne!(lock_id("a"), lock_id("b"));
    }

    #[test]
    fn test_record_expiry() {
        let live = LockRecord::new("locks/a", Duration::from_secs(30));
        assert!(!live.is_expired());

        let stale = LockRecord {
            id: "locks/a".to_string(),
            expires_at: Utc::now() - TimeDelta::seconds(1),
        };
        assert!(stale.is_expired());
    }

    #[test]
    fn test_version_token() {
        assert!(VersionToken::absent().is_absent());
        assert_eq!(VersionToken::absent(), VersionToken::default());

        let token = VersionToken::new("etag-1");
        assert!(!token.is_absent());
        assert_eq!(token.as_str(), Some("etag-1"));
        assert_ne!(token, VersionToken::new("etag-2"));
    }

    #[test]
    fn test_record_round_trips_as_millis() {
        let record = LockRecord::new("locks/a", Duration::from_secs(5));
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["expires_at"].is_i64());
        let back: LockRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.expires_at.timestamp_millis(), record.expires_at.timestamp_millis());
    }

    #[test]
    fn test_oversized_lifetime_saturates() {
        let record = LockRecord::new("locks/a", Duration::MAX);
        assert!(!record.is_expired());
    }
}
