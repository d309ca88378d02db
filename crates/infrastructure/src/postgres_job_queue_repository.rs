//! PostgreSQL-backed at-least-once job queue, grounded on the teacher's
//! `postgres_workflow_repository/queue.rs` claim/lease/complete pattern,
//! generalized from a single workflow queue to capability-filtered,
//! multi-priority job claims with a dead-letter sink.

use async_trait::async_trait;
use casare_application::{ClaimedJob, DlqRow, EnqueueJobInput, JobQueueRepository};
use casare_core::{AppError, AppResult, TenantId};
use casare_domain::{
    Capability, Job, JobFailureCategory, JobId, JobPriority, JobStatus, RobotId, TriggerType,
    WorkflowVersionId,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeSet;

mod claim;
mod lifecycle;

/// PostgreSQL-backed repository for the job queue and dead-letter sink.
#[derive(Clone)]
pub struct PostgresJobQueueRepository {
    pool: PgPool,
}

impl PostgresJobQueueRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    workflow_version: uuid::Uuid,
    priority: i16,
    variables: serde_json::Value,
    trigger_type: String,
    status: String,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    assigned_robot: Option<uuid::Uuid>,
    retry_count: i32,
    max_retries: i32,
    result: Option<serde_json::Value>,
    error: Option<String>,
    scheduled_time: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> AppResult<Job> {
        Ok(Job::from_parts(
            JobId::from_uuid(self.id),
            TenantId::from_uuid(self.tenant_id),
            WorkflowVersionId::from_uuid(self.workflow_version),
            JobPriority::from_u8(u8::try_from(self.priority).map_err(|error| {
                AppError::Internal(format!("invalid stored job priority: {error}"))
            })?)?,
            self.variables,
            TriggerType::parse(self.trigger_type.as_str())?,
            JobStatus::parse(self.status.as_str())?,
            self.created_at,
            self.claimed_at,
            self.started_at,
            self.completed_at,
            self.assigned_robot.map(RobotId::from_uuid),
            u32::try_from(self.retry_count)
                .map_err(|error| AppError::Internal(format!("invalid retry_count: {error}")))?,
            u32::try_from(self.max_retries)
                .map_err(|error| AppError::Internal(format!("invalid max_retries: {error}")))?,
            self.result,
            self.error,
            self.scheduled_time,
        ))
    }
}

#[derive(Debug, FromRow)]
struct ClaimedJobRow {
    #[sqlx(flatten)]
    job: JobRow,
    lease_token: String,
    lease_expires_at: DateTime<Utc>,
}

impl ClaimedJobRow {
    fn into_claimed_job(self) -> AppResult<ClaimedJob> {
        Ok(ClaimedJob {
            job: self.job.into_job()?,
            lease_token: self.lease_token,
            lease_expires_at: self.lease_expires_at,
        })
    }
}

fn capabilities_to_storage(capabilities: &BTreeSet<Capability>) -> Vec<String> {
    capabilities.iter().map(Capability::as_storage_string).collect()
}

#[async_trait]
impl JobQueueRepository for PostgresJobQueueRepository {
    async fn enqueue(&self, input: EnqueueJobInput) -> AppResult<Job> {
        self.enqueue_impl(input).await
    }

    async fn claim(
        &self,
        robot_id: RobotId,
        robot_capabilities: &BTreeSet<Capability>,
        max_n: u32,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedJob>> {
        self.claim_impl(robot_id, robot_capabilities, max_n, lease_seconds)
            .await
    }

    async fn heartbeat_claim(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        lease_seconds: u32,
    ) -> AppResult<DateTime<Utc>> {
        self.heartbeat_claim_impl(job_id, robot_id, lease_token, lease_seconds)
            .await
    }

    async fn start(&self, job_id: JobId, robot_id: RobotId, lease_token: &str) -> AppResult<Job> {
        self.start_impl(job_id, robot_id, lease_token).await
    }

    async fn complete(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        result: serde_json::Value,
    ) -> AppResult<Job> {
        self.complete_impl(job_id, robot_id, lease_token, result).await
    }

    async fn fail(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        error: &str,
        category: JobFailureCategory,
    ) -> AppResult<(Job, Option<DlqRow>)> {
        self.fail_impl(job_id, robot_id, lease_token, error, category)
            .await
    }

    async fn cancel(&self, job_id: JobId, reason: &str) -> AppResult<Job> {
        self.cancel_impl(job_id, reason).await
    }

    async fn find(&self, job_id: JobId) -> AppResult<Option<Job>> {
        self.find_impl(job_id).await
    }

    async fn list(&self, tenant_id: TenantId, limit: u32, offset: u32) -> AppResult<Vec<Job>> {
        self.list_impl(tenant_id, limit, offset).await
    }

    async fn find_expired_leases(&self, now: DateTime<Utc>) -> AppResult<Vec<ClaimedJob>> {
        self.find_expired_leases_impl(now).await
    }

    async fn reclaim(&self, job_id: JobId) -> AppResult<Job> {
        self.reclaim_impl(job_id).await
    }

    async fn purge_dead_letters_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.purge_dead_letters_older_than_impl(cutoff).await
    }
}
