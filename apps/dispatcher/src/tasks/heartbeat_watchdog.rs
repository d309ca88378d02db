//! Liveness sweep: reclaims jobs whose lease expired without a heartbeat
//! and flips robots that have gone quiet to `Offline`.

use async_trait::async_trait;
use casare_application::{AuditLogService, JobQueueService, RobotRegistryService};
use casare_core::AppResult;
use casare_domain::{ActorRef, AuditAction, ResourceRef};
use chrono::Utc;
use serde_json::json;

use super::PeriodicTask;

/// Periodic task reclaiming expired job leases and marking stale robots
/// offline.
pub struct HeartbeatWatchdogTask {
    job_queue: JobQueueService,
    robots: RobotRegistryService,
    audit_log: AuditLogService,
    liveness_window_seconds: i64,
}

impl HeartbeatWatchdogTask {
    /// Creates a new heartbeat watchdog task.
    #[must_use]
    pub fn new(
        job_queue: JobQueueService,
        robots: RobotRegistryService,
        audit_log: AuditLogService,
        liveness_window_seconds: i64,
    ) -> Self {
        Self {
            job_queue,
            robots,
            audit_log,
            liveness_window_seconds,
        }
    }
}

#[async_trait]
impl PeriodicTask for HeartbeatWatchdogTask {
    fn scope_key(&self) -> &str {
        "heartbeat-watchdog"
    }

    async fn tick(&self) -> AppResult<()> {
        let now = Utc::now();

        let reclaimed = self.job_queue.reclaim_expired_leases(now).await?;
        if reclaimed > 0 {
            self.audit_log
                .record(
                    now,
                    AuditAction::JobFailed,
                    ActorRef::System,
                    ResourceRef {
                        resource_type: "job".to_owned(),
                        resource_id: "lease-sweep".to_owned(),
                    },
                    None,
                    json!({ "reclaimed": reclaimed }),
                    None,
                    None,
                )
                .await?;
        }

        let flipped = self
            .robots
            .sweep_stale_robots(now, chrono::Duration::seconds(self.liveness_window_seconds))
            .await?;
        if flipped > 0 {
            self.audit_log
                .record(
                    now,
                    AuditAction::RobotMarkedOffline,
                    ActorRef::System,
                    ResourceRef {
                        resource_type: "robot".to_owned(),
                        resource_id: "liveness-sweep".to_owned(),
                    },
                    None,
                    json!({ "flipped_offline": flipped }),
                    None,
                    None,
                )
                .await?;
        }

        Ok(())
    }
}
