use async_trait::async_trait;
use chrono::DateTime;
use serde::Serialize;

use std::time::Duration;

use super::{CleanupJob, CleanupScheduler, SchedulerError};

/// Registers one-shot jobs with an external scheduling service. When a job
/// fires, the service POSTs its `input` to `cleanup_url`.
pub struct HttpScheduler {
    client: reqwest::Client,
    endpoint: String,
    cleanup_url: String,
}

#[derive(Debug, Serialize)]
struct ScheduleRequest<'a> {
    name: String,
    schedule_expression: String,
    target: ScheduleTarget<'a>,
    action_after_completion: &'static str,
}

#[derive(Debug, Serialize)]
struct ScheduleTarget<'a> {
    url: &'a str,
    input: CleanupJob,
}

/// `at(YYYY-MM-DDTHH:MM:SS)` in UTC.
fn schedule_expression(fire_at: i64) -> Result<String, SchedulerError> {
    let at = DateTime::from_timestamp(fire_at, 0).ok_or(SchedulerError::InvalidFireTime(fire_at))?;
    Ok(format!("at({})", at.format("%Y-%m-%dT%H:%M:%S")))
}

impl HttpScheduler {
    pub fn new(
        endpoint: String,
        cleanup_url: String,
        timeout: Duration,
    ) -> Result<Self, SchedulerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            cleanup_url,
        })
    }

    fn request(&self, job: CleanupJob) -> Result<ScheduleRequest<'_>, SchedulerError> {
        Ok(ScheduleRequest {
            name: format!("cleanup-{}", job.note_id),
            schedule_expression: schedule_expression(job.fire_at)?,
            target: ScheduleTarget {
                url: &self.cleanup_url,
                input: job,
            },
            action_after_completion: "DELETE",
        })
    }
}

#[async_trait]
impl CleanupScheduler for HttpScheduler {
    async fn schedule(&self, job: CleanupJob) -> Result<(), SchedulerError> {
        let request = self.request(job)?;

        let response = self
            .client
            .post(format!("{}/schedules", self.endpoint.trim_end_matches('/')))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SchedulerError::Rejected(response.status()));
        }

        tracing::debug!(note_id = %job.note_id, "Cleanup job registered as '{}'", request.name);

        Ok(())
    }
}
