//! Trigger evaluation sweep: finds due schedules, gates each through the
//! schedule engine, enqueues the resulting job, replays any fires missed
//! while the dispatcher was down, and advances `next_run`.
//!
//! No condition or rate-limit configuration is persisted alongside a
//! schedule in this system, so every gate evaluation runs with both left
//! `None`; the `ConditionNotMet`/`RateLimited`/`Delay` branches of
//! `evaluate_fire` are consequently unreachable here today; they are kept
//! live in the match so a future schema addition only needs to thread the
//! loaded configuration through, not rewrite this task.

use std::collections::BTreeSet;

use async_trait::async_trait;
use casare_application::{
    AuditLogService, EnqueueJobInput, FireDecision, JobQueueService, ScheduleEngineService,
    SuppressReason, WorkflowVersionService,
};
use casare_core::AppResult;
use casare_domain::{
    ActorRef, AuditAction, ExecutionHistoryRecord, JobPriority, ResourceRef, Schedule, TriggerType,
    WorkflowId,
};
use chrono::{DateTime, Utc};
use serde_json::json;

use super::PeriodicTask;

/// Periodic task evaluating and firing due schedules.
pub struct ScheduleTickerTask {
    schedules: ScheduleEngineService,
    workflow_versions: WorkflowVersionService,
    job_queue: JobQueueService,
    audit_log: AuditLogService,
    default_job_max_retries: u32,
    max_catchup_runs: u32,
    catchup_window_seconds: u64,
}

impl ScheduleTickerTask {
    /// Creates a new schedule ticker task.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        schedules: ScheduleEngineService,
        workflow_versions: WorkflowVersionService,
        job_queue: JobQueueService,
        audit_log: AuditLogService,
        default_job_max_retries: u32,
        max_catchup_runs: u32,
        catchup_window_seconds: u64,
    ) -> Self {
        Self {
            schedules,
            workflow_versions,
            job_queue,
            audit_log,
            default_job_max_retries,
            max_catchup_runs,
            catchup_window_seconds,
        }
    }

    async fn process_due_schedule(&self, schedule: Schedule, now: DateTime<Utc>) -> AppResult<()> {
        let workflow_id = schedule.workflow_id();
        let due_at = schedule.next_run().unwrap_or(now);

        let calendar = self.schedules.load_calendar(&schedule).await?;
        let blackouts = match &calendar {
            Some(calendar) => self.schedules.load_blackouts(calendar).await?,
            None => Vec::new(),
        };

        let decision = self
            .schedules
            .evaluate_fire(&schedule, workflow_id, calendar.as_ref(), &blackouts, None, None, now)
            .await?;

        match &decision {
            FireDecision::Fire => {
                let missed = self.schedules.compute_catchup_fires(
                    &schedule,
                    due_at,
                    now,
                    self.max_catchup_runs,
                    self.catchup_window_seconds,
                )?;

                for missed_at in missed {
                    self.fire(&schedule, workflow_id, missed_at, true).await?;
                }

                self.fire(&schedule, workflow_id, due_at, false).await?;
            }
            FireDecision::Delay(_) => {
                self.record_suppression(&schedule, &SuppressReason::RateLimited).await?;
            }
            FireDecision::Suppressed(reason) => {
                self.record_suppression(&schedule, reason).await?;
            }
        }

        self.schedules.advance(schedule, now).await?;

        Ok(())
    }

    async fn fire(
        &self,
        schedule: &Schedule,
        workflow_id: WorkflowId,
        scheduled_time: DateTime<Utc>,
        catch_up: bool,
    ) -> AppResult<()> {
        let version = self.workflow_versions.resolve_for_execution(workflow_id).await?;
        let priority = JobPriority::from_u8(schedule.priority()).unwrap_or(JobPriority::Normal);

        self.job_queue
            .enqueue(EnqueueJobInput {
                tenant_id: schedule.tenant_id(),
                workflow_version: version.id(),
                priority,
                variables: schedule.variables().clone(),
                trigger_type: TriggerType::Scheduled,
                max_retries: self.default_job_max_retries,
                scheduled_time,
                required_capabilities: BTreeSet::new(),
            })
            .await?;

        self.schedules
            .append_history(ExecutionHistoryRecord::new(schedule.id(), scheduled_time, catch_up))
            .await?;

        self.audit_log
            .record(
                Utc::now(),
                AuditAction::ScheduleFired,
                ActorRef::System,
                ResourceRef {
                    resource_type: "schedule".to_owned(),
                    resource_id: schedule.id().to_string(),
                },
                Some(schedule.tenant_id()),
                json!({ "catch_up": catch_up, "scheduled_time": scheduled_time }),
                None,
                None,
            )
            .await?;

        Ok(())
    }

    async fn record_suppression(&self, schedule: &Schedule, reason: &SuppressReason) -> AppResult<()> {
        self.audit_log
            .record(
                Utc::now(),
                AuditAction::ScheduleSuppressed,
                ActorRef::System,
                ResourceRef {
                    resource_type: "schedule".to_owned(),
                    resource_id: schedule.id().to_string(),
                },
                Some(schedule.tenant_id()),
                json!({ "reason": format!("{reason:?}") }),
                None,
                None,
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl PeriodicTask for ScheduleTickerTask {
    fn scope_key(&self) -> &str {
        "schedule-ticker"
    }

    async fn tick(&self) -> AppResult<()> {
        let now = Utc::now();

        for schedule in self.schedules.find_due(now).await? {
            self.process_due_schedule(schedule, now).await?;
        }

        Ok(())
    }
}
