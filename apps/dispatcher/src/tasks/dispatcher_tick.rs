//! Cross-tenant assignment sweep matching idle robots to due, claimable
//! jobs. Delivers each new assignment's `JobAssign` frame to whichever
//! `casare-orchestrator-api` instance holds the target robot's websocket,
//! over the Redis frame bus, since the dispatcher process never holds that
//! socket itself.

use std::sync::Arc;

use async_trait::async_trait;
use casare_application::{
    AuditLogService, DispatchOutcome, DispatcherService, JobQueueService, RobotRegistryService,
    RobotFrame, TenantRepository, WorkflowVersionService,
};
use casare_core::AppResult;
use casare_domain::{ActorRef, AuditAction, JobId, ResourceRef, RobotId};
use casare_infrastructure::RedisRobotFrameBus;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::PeriodicTask;

/// Periodic task assigning queued jobs to idle, capability-matching robots
/// across every active tenant.
pub struct DispatcherTickTask {
    tenants: Arc<dyn TenantRepository>,
    robots: RobotRegistryService,
    job_queue: JobQueueService,
    dispatcher: DispatcherService,
    workflow_versions: WorkflowVersionService,
    audit_log: AuditLogService,
    frame_bus: Arc<RedisRobotFrameBus>,
    lease_seconds: u32,
}

impl DispatcherTickTask {
    /// Creates a new dispatcher tick task.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        robots: RobotRegistryService,
        job_queue: JobQueueService,
        dispatcher: DispatcherService,
        workflow_versions: WorkflowVersionService,
        audit_log: AuditLogService,
        frame_bus: Arc<RedisRobotFrameBus>,
        lease_seconds: u32,
    ) -> Self {
        Self {
            tenants,
            robots,
            job_queue,
            dispatcher,
            workflow_versions,
            audit_log,
            frame_bus,
            lease_seconds,
        }
    }

    async fn deliver_assignment(
        &self,
        robot_id: RobotId,
        job_id: JobId,
        lease_token: String,
    ) -> AppResult<()> {
        let Some(job) = self.job_queue.find(job_id).await? else {
            return Ok(());
        };

        let Some(version) = self
            .workflow_versions
            .find_version(job.workflow_version())
            .await?
        else {
            return Ok(());
        };

        let frame = RobotFrame::JobAssign {
            correlation_id: Uuid::new_v4(),
            job_id,
            lease_token,
            payload: json!({
                "variables": job.variables(),
                "workflow": version.payload(),
            }),
        };

        self.frame_bus.publish(robot_id, &frame).await?;

        self.audit_log
            .record(
                Utc::now(),
                AuditAction::JobAssigned,
                ActorRef::System,
                ResourceRef {
                    resource_type: "job".to_owned(),
                    resource_id: job_id.to_string(),
                },
                Some(job.tenant_id()),
                json!({ "robot_id": robot_id.to_string() }),
                None,
                None,
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl PeriodicTask for DispatcherTickTask {
    fn scope_key(&self) -> &str {
        "dispatcher-tick"
    }

    async fn tick(&self) -> AppResult<()> {
        for tenant in self.tenants.list_active_tenants().await? {
            let candidates = self.robots.list(tenant.id()).await?;
            if candidates.is_empty() {
                continue;
            }

            let outcomes = self
                .dispatcher
                .run_tick(&candidates, self.lease_seconds)
                .await?;

            for outcome in outcomes {
                if let DispatchOutcome::Assigned {
                    robot_id,
                    job_id,
                    lease_token,
                    ..
                } = outcome
                {
                    self.deliver_assignment(robot_id, job_id, lease_token).await?;
                }
            }
        }

        Ok(())
    }
}
