use casare_core::{define_uuid_id, AppError, AppResult, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::robot::RobotId;
use crate::workflow::WorkflowVersionId;

define_uuid_id!(
    /// Identifier for a job execution request.
    JobId
);

/// Execution priority; higher values are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum JobPriority {
    /// Background work, dispatched only once nothing higher is pending.
    Low = 0,
    /// Default priority for ordinary submissions.
    Normal = 1,
    /// Elevated priority for time-sensitive work.
    High = 2,
    /// Highest priority; dispatched ahead of everything else.
    Critical = 3,
}

impl JobPriority {
    /// Converts a raw integer (0-3) to a priority, defaulting out-of-range
    /// values are rejected rather than clamped.
    pub fn from_u8(value: u8) -> AppResult<Self> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Normal),
            2 => Ok(Self::High),
            3 => Ok(Self::Critical),
            other => Err(AppError::Validation(format!(
                "priority must be 0..=3, got {other}"
            ))),
        }
    }

    /// Converts this priority to its raw integer representation.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// What caused a job to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Submitted directly by an operator.
    Manual,
    /// Emitted by the schedule engine.
    Scheduled,
    /// Submitted through the Control API by an external caller.
    Api,
    /// Submitted by an inbound webhook call.
    Webhook,
    /// Emitted in response to an external event.
    Event,
}

impl TriggerType {
    /// Returns a stable storage value for this trigger type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Api => "api",
            Self::Webhook => "webhook",
            Self::Event => "event",
        }
    }

    /// Parses a stored trigger type value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            "api" => Ok(Self::Api),
            "webhook" => Ok(Self::Webhook),
            "event" => Ok(Self::Event),
            other => Err(AppError::Validation(format!(
                "unknown trigger type value '{other}'"
            ))),
        }
    }
}

/// Lifecycle state of a job.
///
/// Transitions: `pending -> queued -> claimed -> running ->
/// {completed | failed | cancelled | timeout}`. `failed` with remaining
/// retries loops back to `queued`; a missed heartbeat past the lease window
/// also returns `claimed`/`running` to `queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet eligible for claim (e.g. scheduled in the future).
    Pending,
    /// Eligible for claim by an idle robot.
    Queued,
    /// Leased to a robot; awaiting acceptance or execution start.
    Claimed,
    /// Actively executing on the assigned robot.
    Running,
    /// Terminal: finished successfully.
    Completed,
    /// Terminal: exhausted retries or failed unrecoverably.
    Failed,
    /// Terminal: cancelled by an operator or the system.
    Cancelled,
    /// Terminal: exceeded its execution deadline.
    Timeout,
}

impl JobStatus {
    /// Returns `true` if this status has no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }

    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Claimed => "claimed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "claimed" => Ok(Self::Claimed),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            other => Err(AppError::Validation(format!(
                "unknown job status value '{other}'"
            ))),
        }
    }

    /// Returns `true` if `self -> next` is one of the documented
    /// transitions.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        use JobStatus::{Cancelled, Claimed, Completed, Failed, Pending, Queued, Running, Timeout};

        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Claimed)
                | (Queued, Cancelled)
                | (Claimed, Running)
                | (Claimed, Queued)
                | (Claimed, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Timeout)
                | (Running, Queued)
                | (Failed, Queued)
        )
    }
}

/// Error category used to classify a job failure for retry/DLQ decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFailureCategory {
    /// Input or workflow definition was invalid; never retryable.
    Validation,
    /// A downstream dependency failed transiently.
    TransientIo,
    /// The operation exceeded its deadline.
    Timeout,
    /// The robot or caller lacked permission to complete the action.
    Permission,
    /// An unexpected internal error on the robot or orchestrator.
    Internal,
    /// The user explicitly aborted the job.
    UserAbort,
}

impl JobFailureCategory {
    /// Returns `true` if jobs failing with this category may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo | Self::Timeout | Self::Internal)
    }
}

/// A scheduled or ad-hoc workflow execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    tenant_id: TenantId,
    workflow_version: WorkflowVersionId,
    priority: JobPriority,
    variables: Value,
    trigger_type: TriggerType,
    status: JobStatus,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    assigned_robot: Option<RobotId>,
    retry_count: u32,
    max_retries: u32,
    result: Option<Value>,
    error: Option<String>,
    scheduled_time: DateTime<Utc>,
}

impl Job {
    /// Creates a new job in `Pending` status.
    pub fn new(
        tenant_id: TenantId,
        workflow_version: WorkflowVersionId,
        priority: JobPriority,
        variables: Value,
        trigger_type: TriggerType,
        max_retries: u32,
        scheduled_time: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        if !variables.is_object() && !variables.is_null() {
            return Err(AppError::Validation(
                "job variables must be a JSON object".to_owned(),
            ));
        }

        Ok(Self {
            id: JobId::new(),
            tenant_id,
            workflow_version,
            priority,
            variables,
            trigger_type,
            status: JobStatus::Pending,
            created_at,
            claimed_at: None,
            started_at: None,
            completed_at: None,
            assigned_robot: None,
            retry_count: 0,
            max_retries,
            result: None,
            error: None,
            scheduled_time,
        })
    }

    /// Reconstructs a job from persisted fields without re-running
    /// creation-time validation (used by repository `FromRow` mappings).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: JobId,
        tenant_id: TenantId,
        workflow_version: WorkflowVersionId,
        priority: JobPriority,
        variables: Value,
        trigger_type: TriggerType,
        status: JobStatus,
        created_at: DateTime<Utc>,
        claimed_at: Option<DateTime<Utc>>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        assigned_robot: Option<RobotId>,
        retry_count: u32,
        max_retries: u32,
        result: Option<Value>,
        error: Option<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            workflow_version,
            priority,
            variables,
            trigger_type,
            status,
            created_at,
            claimed_at,
            started_at,
            completed_at,
            assigned_robot,
            retry_count,
            max_retries,
            result,
            error,
            scheduled_time,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the workflow version this job targets.
    #[must_use]
    pub fn workflow_version(&self) -> WorkflowVersionId {
        self.workflow_version
    }

    /// Returns the job's priority.
    #[must_use]
    pub fn priority(&self) -> JobPriority {
        self.priority
    }

    /// Returns the job's input variables.
    #[must_use]
    pub fn variables(&self) -> &Value {
        &self.variables
    }

    /// Returns what triggered this job.
    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        self.trigger_type
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Returns the robot currently leased to execute this job, if any.
    #[must_use]
    pub fn assigned_robot(&self) -> Option<RobotId> {
        self.assigned_robot
    }

    /// Returns the number of retries already attempted.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the maximum number of retries permitted.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the time this job is eligible to fire.
    #[must_use]
    pub fn scheduled_time(&self) -> DateTime<Utc> {
        self.scheduled_time
    }

    /// Returns the time the job was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the time the job started running, if it has.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns the time the job reached a terminal state, if it has.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the job's result payload, if it completed successfully.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Returns the job's terminal error message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Transitions `Pending -> Queued`, the state in which a job becomes
    /// eligible for claim.
    pub fn enqueue(&mut self) -> AppResult<()> {
        self.transition(JobStatus::Queued)
    }

    /// Transitions `Queued -> Claimed`, recording the assigned robot and
    /// claim time.
    pub fn claim(&mut self, robot: RobotId, at: DateTime<Utc>) -> AppResult<()> {
        self.transition(JobStatus::Claimed)?;
        self.assigned_robot = Some(robot);
        self.claimed_at = Some(at);
        Ok(())
    }

    /// Transitions `Claimed -> Running`.
    pub fn start(&mut self, at: DateTime<Utc>) -> AppResult<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(at);
        Ok(())
    }

    /// Transitions to `Completed`, recording the result payload.
    pub fn complete(&mut self, result: Value, at: DateTime<Utc>) -> AppResult<()> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(at);
        Ok(())
    }

    /// Records a failed attempt. If `retry_count < max_retries` and
    /// `category` is retryable, the job returns to `Queued` with
    /// `retry_count` incremented; otherwise it becomes terminally `Failed`
    /// and the caller should write a DLQ row.
    ///
    /// Returns `true` if the job was moved to the DLQ (terminal failure).
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        category: JobFailureCategory,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let error = error.into();
        let retryable = category.is_retryable() && self.retry_count < self.max_retries;

        if retryable {
            self.transition(JobStatus::Queued)?;
            self.retry_count += 1;
            self.error = Some(error);
            self.assigned_robot = None;
            self.claimed_at = None;
            self.started_at = None;
            Ok(false)
        } else {
            self.transition(JobStatus::Failed)?;
            self.error = Some(error);
            self.completed_at = Some(at);
            Ok(true)
        }
    }

    /// Transitions to terminal `Cancelled`.
    pub fn cancel(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> AppResult<()> {
        self.transition(JobStatus::Cancelled)?;
        self.error = Some(reason.into());
        self.completed_at = Some(at);
        Ok(())
    }

    /// Transitions to terminal `Timeout`.
    pub fn timeout(&mut self, at: DateTime<Utc>) -> AppResult<()> {
        self.transition(JobStatus::Timeout)?;
        self.completed_at = Some(at);
        Ok(())
    }

    /// Reclaims a job whose lease expired without a heartbeat, returning
    /// `Claimed`/`Running` to `Queued` so it can be reassigned.
    pub fn reclaim(&mut self) -> AppResult<()> {
        self.transition(JobStatus::Queued)?;
        self.assigned_robot = None;
        self.claimed_at = None;
        self.started_at = None;
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "cannot transition job from {:?} to {:?}",
                self.status, next
            )));
        }

        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Job, JobFailureCategory, JobPriority, JobStatus, TriggerType};
    use casare_core::TenantId;
    use crate::robot::RobotId;
    use crate::workflow::WorkflowVersionId;
    use chrono::Utc;
    use serde_json::json;

    fn new_job(max_retries: u32) -> Job {
        Job::new(
            TenantId::new(),
            WorkflowVersionId::new(),
            JobPriority::Normal,
            json!({"x": 7}),
            TriggerType::Manual,
            max_retries,
            Utc::now(),
            Utc::now(),
        )
        .expect("valid job")
    }

    #[test]
    fn happy_path_reaches_completed() {
        let mut job = new_job(2);
        job.enqueue().expect("enqueue");
        job.claim(RobotId::new(), Utc::now()).expect("claim");
        job.start(Utc::now()).expect("start");
        job.complete(json!({"ok": true}), Utc::now()).expect("complete");
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn non_retryable_failure_moves_to_dlq_immediately() {
        let mut job = new_job(2);
        job.enqueue().expect("enqueue");
        job.claim(RobotId::new(), Utc::now()).expect("claim");
        job.start(Utc::now()).expect("start");
        let moved_to_dlq = job
            .fail("bad input", JobFailureCategory::Validation, Utc::now())
            .expect("fail");
        assert!(moved_to_dlq);
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.retry_count(), 0);
    }

    #[test]
    fn retryable_failure_requeues_until_retries_exhausted() {
        let mut job = new_job(2);
        job.enqueue().expect("enqueue");

        for expected_retry_count in 0..2 {
            job.claim(RobotId::new(), Utc::now()).expect("claim");
            job.start(Utc::now()).expect("start");
            let moved_to_dlq = job
                .fail("transient", JobFailureCategory::TransientIo, Utc::now())
                .expect("fail");
            assert!(!moved_to_dlq);
            assert_eq!(job.retry_count(), expected_retry_count + 1);
            assert_eq!(job.status(), JobStatus::Queued);
        }

        job.claim(RobotId::new(), Utc::now()).expect("claim");
        job.start(Utc::now()).expect("start");
        let moved_to_dlq = job
            .fail("transient", JobFailureCategory::TransientIo, Utc::now())
            .expect("fail");
        assert!(moved_to_dlq);
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.retry_count(), 2);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut job = new_job(2);
        assert!(job.start(Utc::now()).is_err());
    }

    #[test]
    fn reclaim_returns_job_to_queue() {
        let mut job = new_job(2);
        job.enqueue().expect("enqueue");
        job.claim(RobotId::new(), Utc::now()).expect("claim");
        job.reclaim().expect("reclaim");
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.assigned_robot().is_none());
    }
}
