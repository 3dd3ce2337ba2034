use async_trait::async_trait;

use std::{sync::Arc, time::Duration};

use super::{CleanupJob, CleanupScheduler, SchedulerError};
use crate::{models::unix_now, repository::NoteStore};

/// In-process timers. Jobs die with the process, which is acceptable because
/// store expiry covers them.
pub struct LocalScheduler {
    store: Arc<dyn NoteStore>,
}

impl LocalScheduler {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CleanupScheduler for LocalScheduler {
    async fn schedule(&self, job: CleanupJob) -> Result<(), SchedulerError> {
        let delay = u64::try_from(job.fire_at - unix_now())
            .map_err(|_| SchedulerError::InvalidFireTime(job.fire_at))?;
        let store = self.store.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            match store.delete(job.note_id).await {
                Ok(true) => tracing::info!(note_id = %job.note_id, "Expired note deleted"),
                Ok(false) => {
                    tracing::debug!(note_id = %job.note_id, "Note already consumed before expiry");
                }
                Err(e) => tracing::error!(note_id = %job.note_id, "Scheduled cleanup failed: {e}"),
            }
        });

        Ok(())
    }
}
