use async_trait::async_trait;
use casare_core::{AppResult, TenantId};
use casare_domain::{Capability, Job, JobId, JobPriority, RobotId, TriggerType, WorkflowVersionId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;

/// Input to `JobQueueRepository::enqueue`.
#[derive(Debug, Clone)]
pub struct EnqueueJobInput {
    /// The tenant the job belongs to.
    pub tenant_id: TenantId,
    /// The workflow version to execute.
    pub workflow_version: WorkflowVersionId,
    /// Execution priority.
    pub priority: JobPriority,
    /// Input variables passed to the workflow.
    pub variables: Value,
    /// What caused this job to be created.
    pub trigger_type: TriggerType,
    /// Maximum retry attempts before dead-lettering.
    pub max_retries: u32,
    /// The time the job becomes eligible to fire.
    pub scheduled_time: DateTime<Utc>,
    /// Capabilities required of a candidate robot.
    pub required_capabilities: BTreeSet<Capability>,
}

/// A job leased to a robot by `claim`, carrying the lease token needed to
/// complete, fail, or heartbeat it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    /// The claimed job.
    pub job: Job,
    /// Opaque lease token; completion/failure calls must present the
    /// matching token or are rejected as `LeaseLost`.
    pub lease_token: String,
    /// The instant the lease expires without a heartbeat.
    pub lease_expires_at: DateTime<Utc>,
}

/// A row written to the dead-letter queue once a job exhausts its
/// retries or fails unrecoverably.
#[derive(Debug, Clone)]
pub struct DlqRow {
    /// The original job identifier, preserved for traceability.
    pub original_job_id: JobId,
    /// The tenant the job belonged to.
    pub tenant_id: TenantId,
    /// The job's input variables at the time of dead-lettering.
    pub variables: Value,
    /// The final error message.
    pub final_error: String,
    /// The last node reported as executing, if the robot provided one.
    pub last_node: Option<String>,
    /// The number of retries already attempted.
    pub retry_count: u32,
    /// The time the row was written.
    pub dead_lettered_at: DateTime<Utc>,
}

/// Repository port for the at-least-once job queue and its dead-letter
/// sink, generalizing the teacher's single-workflow claim/lease/complete
/// pattern to filtered, capability-aware, multi-job claims.
#[async_trait]
pub trait JobQueueRepository: Send + Sync {
    /// Enqueues a new job in `Pending`/`Queued` status, subject to quota
    /// checks performed by the caller in the same transaction.
    async fn enqueue(&self, input: EnqueueJobInput) -> AppResult<Job>;

    /// Claims up to `max_n` due, queued jobs whose required capabilities
    /// are satisfied by the claiming robot, ordered by
    /// `(priority DESC, scheduled_time ASC, created_at ASC)`, using
    /// `FOR UPDATE SKIP LOCKED` semantics so concurrent claimers never
    /// contend on the same row.
    async fn claim(
        &self,
        robot_id: RobotId,
        robot_capabilities: &BTreeSet<Capability>,
        max_n: u32,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedJob>>;

    /// Extends an existing lease in response to a robot heartbeat.
    /// Returns `AppError::LeaseLost` if `lease_token` no longer matches.
    async fn heartbeat_claim(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        lease_seconds: u32,
    ) -> AppResult<DateTime<Utc>>;

    /// Transitions a claimed job to `Running` once the robot acknowledges
    /// it with `job_accept`. Returns `AppError::LeaseLost` if `lease_token`
    /// no longer matches (the lease expired and was reassigned).
    async fn start(&self, job_id: JobId, robot_id: RobotId, lease_token: &str) -> AppResult<Job>;

    /// Marks a leased job complete. Returns `AppError::LeaseLost` if
    /// `lease_token` no longer matches (the lease expired and was
    /// reassigned).
    async fn complete(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        result: Value,
    ) -> AppResult<Job>;

    /// Records a failed attempt. On terminal failure the repository also
    /// writes the DLQ row in the same transaction. Returns the updated job
    /// and, if it was dead-lettered, the written `DlqRow`.
    async fn fail(
        &self,
        job_id: JobId,
        robot_id: RobotId,
        lease_token: &str,
        error: &str,
        category: casare_domain::JobFailureCategory,
    ) -> AppResult<(Job, Option<DlqRow>)>;

    /// Cancels a job. Fails with `AppError::Conflict` if it is already
    /// terminal.
    async fn cancel(&self, job_id: JobId, reason: &str) -> AppResult<Job>;

    /// Returns a job by id.
    async fn find(&self, job_id: JobId) -> AppResult<Option<Job>>;

    /// Lists jobs for a tenant, most recently created first.
    async fn list(&self, tenant_id: TenantId, limit: u32, offset: u32) -> AppResult<Vec<Job>>;

    /// Returns every job whose lease expired without a heartbeat, so the
    /// heartbeat watchdog can reclaim them.
    async fn find_expired_leases(&self, now: DateTime<Utc>) -> AppResult<Vec<ClaimedJob>>;

    /// Reclaims an expired-lease job, returning it to `Queued`.
    async fn reclaim(&self, job_id: JobId) -> AppResult<Job>;

    /// Deletes dead-letter rows written before `cutoff`, for the DLQ
    /// retention sweep. Returns the number of rows removed.
    async fn purge_dead_letters_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
