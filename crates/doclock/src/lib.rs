//! Distributed mutual-exclusion lock coordinated through a document store.
//!
//! This crate provides:
//! - The lease-based lock protocol over conditional writes ([`LockCoordinator`])
//! - The document store collaborator as traits ([`DocumentStore`], [`DocumentSession`])
//! - An in-memory store backend for tests and single-process use ([`MemoryStore`])
//!
//! The lock record's existence in the store is the lock: whichever
//! coordinator wins the conditional create holds the lease until it renews,
//! releases, or the lease lapses. Contenders poll on a fixed interval and
//! reclaim abandoned records once their expiry has passed.
//!
//! ```no_run
//! use std::time::Duration;
//! use doclock::{LockCoordinator, MemoryStore};
//!
//! # async fn example() -> Result<(), doclock::LockError> {
//! let store = MemoryStore::new();
//! let mut lock = LockCoordinator::acquire(
//!     &store,
//!     "batch-job",
//!     Duration::from_secs(10),
//!     Duration::from_secs(5),
//! )
//! .await?;
//!
//! // ... do the serialized work, renewing if it runs long ...
//! lock.renew(Duration::from_secs(5)).await?;
//!
//! lock.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod store;

pub use config::LockConfig;
pub use coordinator::LockCoordinator;
pub use error::LockError;
pub use model::{LockRecord, VersionToken, lock_id};
pub use store::{DocumentSession, DocumentStore, MemoryStore, StoreError};
