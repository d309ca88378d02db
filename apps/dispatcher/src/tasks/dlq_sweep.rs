//! Periodically purges dead-letter rows past their retention window.

use async_trait::async_trait;
use casare_application::JobQueueService;
use casare_core::AppResult;
use chrono::Utc;
use tracing::info;

use super::PeriodicTask;

/// Periodic task purging expired dead-letter rows.
pub struct DlqSweepTask {
    job_queue: JobQueueService,
    retention_days: i64,
}

impl DlqSweepTask {
    /// Creates a new DLQ sweep task.
    #[must_use]
    pub fn new(job_queue: JobQueueService, retention_days: i64) -> Self {
        Self {
            job_queue,
            retention_days,
        }
    }
}

#[async_trait]
impl PeriodicTask for DlqSweepTask {
    fn scope_key(&self) -> &str {
        "dlq-sweep"
    }

    async fn tick(&self) -> AppResult<()> {
        let purged = self
            .job_queue
            .purge_dead_letters(Utc::now(), chrono::Duration::days(self.retention_days))
            .await?;

        if purged > 0 {
            info!(purged, "purged expired dead-letter rows");
        }

        Ok(())
    }
}
