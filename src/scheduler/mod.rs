//! Deferred cleanup.
//!
//! Scheduling is best-effort: a job may fail to register or never fire.
//! Store-side expiry is the only guaranteed cleanup path, so nothing may
//! depend on a scheduled job actually running.

mod http;
mod local;

pub use http::HttpScheduler;
pub use local::LocalScheduler;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Payload delivered to the cleanup action when the job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupJob {
    pub note_id: Uuid,
    /// Seconds since the Unix epoch.
    #[serde(skip)]
    pub fire_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scheduler rejected the job with status {0}")]
    Rejected(reqwest::StatusCode),

    #[error("fire time {0} is not a valid timestamp")]
    InvalidFireTime(i64),
}

#[async_trait]
pub trait CleanupScheduler: Send + Sync {
    async fn schedule(&self, job: CleanupJob) -> Result<(), SchedulerError>;
}

/// Accepts everything and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

#[async_trait]
impl CleanupScheduler for NoopScheduler {
    async fn schedule(&self, job: CleanupJob) -> Result<(), SchedulerError> {
        tracing::debug!(note_id = %job.note_id, "Scheduling disabled, leaving cleanup to store expiry");
        Ok(())
    }
}
