//! Note storage.
//!
//! Every exactly-once guarantee of the service comes from here: [`NoteStore::take`]
//! and [`NoteStore::take_if`] must each be a single atomic step with respect to
//! every other operation on the same id. Expired records are treated as absent
//! by all reads, and [`spawn_expiry_sweeper`] removes them physically.

mod embedded;
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use std::{sync::Arc, time::Duration};

use crate::models::{Note, unix_now};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] refinery::Error),

    #[error("note {0} already exists")]
    Conflict(Uuid),
}

/// Result of a compare-and-delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeOutcome {
    /// The check passed and the record was removed.
    Taken(Note),
    /// The check failed. The record is untouched.
    Refused,
    /// No live record under that id.
    Absent,
}

pub type NoteCheck<'a> = &'a (dyn Fn(&Note) -> bool + Send + Sync);

#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Conditional put: fails with [`StoreError::Conflict`] if the id exists.
    async fn insert(&self, note: &Note) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Note>, StoreError>;

    /// Atomic delete-if-exists returning the prior record.
    async fn take(&self, id: Uuid) -> Result<Option<Note>, StoreError>;

    /// Atomic compare-and-delete: `check` runs against the locked record and
    /// the record is removed only if it returns true.
    async fn take_if(&self, id: Uuid, check: NoteCheck<'_>) -> Result<TakeOutcome, StoreError>;

    /// Plain delete. Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Removes every record whose deadline is at or before `now`.
    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError>;
}

/// Passive expiry. Runs until the runtime shuts down.
pub fn spawn_expiry_sweeper(
    store: Arc<dyn NoteStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired(unix_now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Expiry sweep removed {} notes", n),
                Err(e) => tracing::error!("Expiry sweep failed: {e}"),
            }
        }
    })
}
