use casare_core::{define_uuid_id, AppError, AppResult, NonEmptyString, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calendar::BusinessCalendarId;
use crate::workflow::WorkflowId;

define_uuid_id!(
    /// Identifier for a schedule trigger configuration.
    ScheduleId
);

/// The five trigger mechanisms a schedule may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleType {
    /// Standard 5/6-field cron expression, evaluated in `timezone`.
    Cron {
        /// The cron expression.
        expression: String,
    },
    /// Fixed period from a reference time.
    Interval {
        /// Period, in seconds, between fires.
        period_seconds: u64,
        /// The instant the interval is anchored to.
        reference_time: DateTime<Utc>,
    },
    /// Fires exactly once at an absolute instant.
    OneTime {
        /// The instant this schedule fires.
        at: DateTime<Utc>,
    },
    /// Fires on an external event, optionally filtered and debounced.
    Event {
        /// The event kind this schedule reacts to.
        event_kind: EventKind,
        /// Optional JSON predicate the event payload must satisfy.
        filter: Option<Value>,
        /// Minimum quiet period between fires of the same event.
        debounce_seconds: Option<u64>,
        /// Optional window over which matching events are batched into a
        /// single fire.
        batch_window_seconds: Option<u64>,
    },
    /// Fires once all (or any) upstream schedules complete within
    /// `timeout_seconds`.
    Dependency {
        /// Upstream schedules this one depends on.
        upstream: Vec<ScheduleId>,
        /// If `true`, every upstream schedule must complete; if `false`,
        /// any one completion is sufficient.
        wait_for_all: bool,
        /// Maximum time to wait for upstream completions before the gate
        /// times out.
        timeout_seconds: u64,
        /// If `true`, upstream completions must additionally have
        /// succeeded.
        require_success: bool,
    },
}

/// An external event kind an `Event` schedule may react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A file appeared in a watched location.
    FileArrival,
    /// An inbound webhook call was received.
    Webhook,
    /// A watched database row changed.
    DatabaseChange,
    /// A message arrived on a watched queue.
    QueueMessage,
    /// An upstream workflow completed.
    WorkflowCompleted,
    /// An operator-defined custom event.
    Custom,
}

/// Operational state of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Firing normally.
    Active,
    /// Temporarily suspended by an operator; `next_run` is not advanced.
    Paused,
    /// Permanently disabled.
    Disabled,
    /// A `one_time` schedule that has already fired.
    Completed,
    /// Stuck in a persistent error state (e.g. repeated condition failure).
    Error,
}

impl ScheduleStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Disabled => "disabled",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "disabled" => Ok(Self::Disabled),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(AppError::Validation(format!(
                "unknown schedule status value '{other}'"
            ))),
        }
    }
}

/// SLA thresholds and current computed status for a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Maximum acceptable execution duration, in seconds.
    pub max_duration_seconds: u64,
    /// Maximum acceptable delay between `scheduled_time` and actual start.
    pub max_start_delay_seconds: u64,
    /// Minimum acceptable success rate, as a percentage in `[0, 100]`.
    pub success_rate_threshold: f32,
    /// Number of consecutive failures that immediately breaches the SLA.
    pub consecutive_failure_limit: u32,
}

/// Computed SLA health for a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    /// Within thresholds.
    Ok,
    /// Below threshold but not yet breached.
    Warning,
    /// Breached one or more hard limits.
    Breached,
}

impl SlaConfig {
    /// Creates a validated SLA configuration.
    pub fn new(
        max_duration_seconds: u64,
        max_start_delay_seconds: u64,
        success_rate_threshold: f32,
        consecutive_failure_limit: u32,
    ) -> AppResult<Self> {
        if !(0.0..=100.0).contains(&success_rate_threshold) {
            return Err(AppError::Validation(
                "success_rate_threshold must be within [0, 100]".to_owned(),
            ));
        }

        Ok(Self {
            max_duration_seconds,
            max_start_delay_seconds,
            success_rate_threshold,
            consecutive_failure_limit,
        })
    }

    /// Computes SLA status from recent run statistics.
    ///
    /// Breached if `consecutive_failures` reaches the configured limit or
    /// `success_rate` falls more than 5 points below threshold; warning if
    /// `success_rate` is below threshold at all; otherwise ok.
    #[must_use]
    pub fn evaluate(&self, success_rate: f32, consecutive_failures: u32) -> SlaStatus {
        if consecutive_failures >= self.consecutive_failure_limit
            || success_rate < self.success_rate_threshold - 5.0
        {
            SlaStatus::Breached
        } else if success_rate < self.success_rate_threshold {
            SlaStatus::Warning
        } else {
            SlaStatus::Ok
        }
    }
}

/// Sliding-window rate limit applied to a schedule's fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum fires allowed within the window.
    pub max_executions: u32,
    /// Window length, in seconds.
    pub window_seconds: u64,
    /// If `true`, fires exceeding the limit are still enqueued with a
    /// delayed `scheduled_time` at the window boundary rather than
    /// dropped.
    pub queue_overflow: bool,
}

/// Outcome of evaluating a `RateLimitConfig` against recent fire
/// timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The fire proceeds immediately.
    Allow,
    /// The fire is delayed to the given instant rather than dropped.
    Delay(DateTime<Utc>),
    /// The fire is dropped.
    Drop,
}

impl RateLimitConfig {
    /// Decides whether a fire at `now`, given the `recent_fires` timestamps
    /// within the trailing window, should proceed, be delayed, or dropped.
    #[must_use]
    pub fn evaluate(&self, now: DateTime<Utc>, recent_fires: &[DateTime<Utc>]) -> RateLimitDecision {
        let window_start = now - chrono::Duration::seconds(self.window_seconds as i64);
        let count_in_window = recent_fires
            .iter()
            .filter(|fire| **fire > window_start)
            .count() as u32;

        if count_in_window < self.max_executions {
            return RateLimitDecision::Allow;
        }

        if self.queue_overflow {
            let oldest_in_window = recent_fires
                .iter()
                .filter(|fire| **fire > window_start)
                .min()
                .copied()
                .unwrap_or(now);
            let boundary = oldest_in_window + chrono::Duration::seconds(self.window_seconds as i64);
            RateLimitDecision::Delay(boundary)
        } else {
            RateLimitDecision::Drop
        }
    }
}

/// Kind of runtime condition gate attached to a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionConfig {
    /// Evaluate a SQL query; truthy scalar result permits the fire.
    SqlQuery {
        /// The query text.
        query: String,
    },
    /// Perform an HTTP health check; a 2xx response permits the fire.
    HttpCheck {
        /// The URL to probe.
        url: String,
    },
    /// Check for the existence of a file or object.
    FileExists {
        /// The path to check.
        path: String,
    },
    /// An operator-defined custom condition, identified by name.
    Custom {
        /// The condition implementation name.
        name: String,
    },
}

/// Retry policy for a failing condition gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRetryPolicy {
    /// Whether to retry the condition on failure.
    pub retry_on_fail: bool,
    /// Maximum retries before giving up and skipping the fire.
    pub max_retries: u32,
    /// Delay between condition retries, in seconds.
    pub retry_interval_seconds: u64,
}

/// Post-downtime replay policy for missed fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchupConfig {
    /// Maximum number of missed fires to replay on resume.
    pub max_catchup_runs: u32,
    /// Only misses within this trailing window (seconds, from resume time)
    /// are eligible for replay.
    pub catchup_window_seconds: u64,
    /// If `true`, catch-up jobs are chained via dependency so miss N+1
    /// waits for miss N.
    pub run_sequentially: bool,
}

/// A directed edge in the schedule dependency graph.
///
/// Invariant: the edge graph is acyclic; inserting an edge that would close
/// a cycle is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    schedule_id: ScheduleId,
    depends_on: ScheduleId,
    wait_for_all: bool,
    require_success: bool,
    timeout_seconds: u64,
    priority_order: i32,
}

impl DependencyEdge {
    /// Creates a new dependency edge. Cycle detection is the
    /// responsibility of the owning service, which has visibility over the
    /// full graph.
    pub fn new(
        schedule_id: ScheduleId,
        depends_on: ScheduleId,
        wait_for_all: bool,
        require_success: bool,
        timeout_seconds: u64,
        priority_order: i32,
    ) -> AppResult<Self> {
        if schedule_id == depends_on {
            return Err(AppError::DependencyCycle(
                "a schedule cannot depend on itself".to_owned(),
            ));
        }

        Ok(Self {
            schedule_id,
            depends_on,
            wait_for_all,
            require_success,
            timeout_seconds,
            priority_order,
        })
    }

    /// Returns the dependent schedule.
    #[must_use]
    pub fn schedule_id(&self) -> ScheduleId {
        self.schedule_id
    }

    /// Returns the upstream schedule this edge depends on.
    #[must_use]
    pub fn depends_on(&self) -> ScheduleId {
        self.depends_on
    }

    /// Returns the timeout, in seconds, for resolving this dependency.
    #[must_use]
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    /// Returns whether a successful completion is required.
    #[must_use]
    pub fn require_success(&self) -> bool {
        self.require_success
    }

    /// Returns whether every upstream edge sharing this dependent must
    /// resolve, versus any one being sufficient.
    #[must_use]
    pub fn wait_for_all(&self) -> bool {
        self.wait_for_all
    }

    /// Returns the UI ordering hint for this edge among its dependent's
    /// other edges.
    #[must_use]
    pub fn priority_order(&self) -> i32 {
        self.priority_order
    }

    /// Reconstructs an edge from persisted fields without re-running the
    /// self-reference check (used by repository `FromRow` mappings, which
    /// only ever read back edges that already passed it once).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        schedule_id: ScheduleId,
        depends_on: ScheduleId,
        wait_for_all: bool,
        require_success: bool,
        timeout_seconds: u64,
        priority_order: i32,
    ) -> Self {
        Self {
            schedule_id,
            depends_on,
            wait_for_all,
            require_success,
            timeout_seconds,
            priority_order,
        }
    }
}

/// Transient record of a schedule's completion, used to resolve pending
/// dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCompletion {
    schedule_id: ScheduleId,
    completed_at: DateTime<Utc>,
    success: bool,
    expires_at: DateTime<Utc>,
}

impl DependencyCompletion {
    /// Records a new completion.
    #[must_use]
    pub fn new(
        schedule_id: ScheduleId,
        completed_at: DateTime<Utc>,
        success: bool,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            schedule_id,
            completed_at,
            success,
            expires_at,
        }
    }

    /// Returns the schedule that completed.
    #[must_use]
    pub fn schedule_id(&self) -> ScheduleId {
        self.schedule_id
    }

    /// Returns whether the completion was successful.
    #[must_use]
    pub fn success(&self) -> bool {
        self.success
    }

    /// Returns the time the upstream schedule completed.
    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Returns the time after which this completion no longer resolves a
    /// dependent.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns `true` if this completion record is still eligible to
    /// resolve a dependent schedule as of `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A trigger configuration binding a workflow to one of the five trigger
/// mechanisms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    id: ScheduleId,
    tenant_id: TenantId,
    workflow_id: WorkflowId,
    name: NonEmptyString,
    schedule_type: ScheduleType,
    timezone: String,
    calendar_id: Option<BusinessCalendarId>,
    priority: u8,
    variables: Value,
    status: ScheduleStatus,
    respect_business_hours: bool,
    next_run: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Creates a new, active schedule.
    pub fn new(
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        name: impl Into<String>,
        schedule_type: ScheduleType,
        timezone: impl Into<String>,
        calendar_id: Option<BusinessCalendarId>,
        priority: u8,
        variables: Value,
        respect_business_hours: bool,
    ) -> AppResult<Self> {
        let timezone = timezone.into();
        let parsed: chrono_tz::Tz = timezone
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid IANA timezone '{timezone}'")))?;
        let _ = parsed;

        Ok(Self {
            id: ScheduleId::new(),
            tenant_id,
            workflow_id,
            name: NonEmptyString::new(name)?,
            schedule_type,
            timezone,
            calendar_id,
            priority,
            variables,
            status: ScheduleStatus::Active,
            respect_business_hours,
            next_run: None,
        })
    }

    /// Reconstructs a schedule from persisted fields without re-running
    /// creation-time validation (used by repository `FromRow` mappings).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: ScheduleId,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        name: NonEmptyString,
        schedule_type: ScheduleType,
        timezone: String,
        calendar_id: Option<BusinessCalendarId>,
        priority: u8,
        variables: Value,
        status: ScheduleStatus,
        respect_business_hours: bool,
        next_run: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            workflow_id,
            name,
            schedule_type,
            timezone,
            calendar_id,
            priority,
            variables,
            status,
            respect_business_hours,
            next_run,
        }
    }

    /// Returns the schedule identifier.
    #[must_use]
    pub fn id(&self) -> ScheduleId {
        self.id
    }

    /// Returns the schedule's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the dispatch priority new jobs are enqueued with.
    #[must_use]
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Returns the variables merged into every job this schedule enqueues.
    #[must_use]
    pub fn variables(&self) -> &Value {
        &self.variables
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the targeted workflow.
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Returns the trigger configuration.
    #[must_use]
    pub fn schedule_type(&self) -> &ScheduleType {
        &self.schedule_type
    }

    /// Returns the IANA timezone name this schedule evaluates in.
    #[must_use]
    pub fn timezone(&self) -> &str {
        self.timezone.as_str()
    }

    /// Returns the business calendar this schedule respects, if any.
    #[must_use]
    pub fn calendar_id(&self) -> Option<BusinessCalendarId> {
        self.calendar_id
    }

    /// Returns the current operational status.
    #[must_use]
    pub fn status(&self) -> ScheduleStatus {
        self.status
    }

    /// Returns whether working-hours gating applies to this schedule.
    #[must_use]
    pub fn respects_business_hours(&self) -> bool {
        self.respect_business_hours
    }

    /// Returns the next computed fire time, if known.
    #[must_use]
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.next_run
    }

    /// Returns `true` if the schedule may currently fire.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        matches!(self.status, ScheduleStatus::Active)
    }

    /// Records the result of evaluating `next_run`.
    pub fn set_next_run(&mut self, next_run: Option<DateTime<Utc>>) {
        self.next_run = next_run;
        if next_run.is_none() && matches!(self.schedule_type, ScheduleType::OneTime { .. }) {
            self.status = ScheduleStatus::Completed;
        }
    }

    /// Pauses the schedule; `next_run` is not advanced while paused.
    pub fn pause(&mut self) {
        self.status = ScheduleStatus::Paused;
    }

    /// Resumes a paused schedule.
    pub fn resume(&mut self) {
        if self.status == ScheduleStatus::Paused {
            self.status = ScheduleStatus::Active;
        }
    }

    /// Disables the schedule permanently.
    pub fn disable(&mut self) {
        self.status = ScheduleStatus::Disabled;
    }

    /// Marks the schedule as stuck in a persistent error state.
    pub fn mark_error(&mut self) {
        self.status = ScheduleStatus::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DependencyEdge, RateLimitConfig, RateLimitDecision, Schedule, ScheduleId, ScheduleType,
        SlaConfig, SlaStatus,
    };
    use casare_core::TenantId;
    use crate::workflow::WorkflowId;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn schedule_rejects_invalid_timezone() {
        let result = Schedule::new(
            TenantId::new(),
            WorkflowId::new(),
            "hourly",
            ScheduleType::Cron {
                expression: "0 * * * *".to_owned(),
            },
            "Not/A_Zone",
            None,
            1,
            json!({}),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn self_dependency_is_rejected() {
        let id = ScheduleId::new();
        assert!(DependencyEdge::new(id, id, true, false, 60, 0).is_err());
    }

    #[test]
    fn sla_breaches_on_consecutive_failures() {
        let sla = SlaConfig::new(3600, 60, 95.0, 3).expect("valid sla");
        assert_eq!(sla.evaluate(99.0, 3), SlaStatus::Breached);
        assert_eq!(sla.evaluate(90.0, 0), SlaStatus::Warning);
        assert_eq!(sla.evaluate(96.0, 0), SlaStatus::Ok);
    }

    #[test]
    fn sla_rejects_threshold_out_of_range() {
        assert!(SlaConfig::new(1, 1, 150.0, 1).is_err());
    }

    #[test]
    fn rate_limit_delays_when_overflow_allowed() {
        let limit = RateLimitConfig {
            max_executions: 1,
            window_seconds: 60,
            queue_overflow: true,
        };
        let now = Utc::now();
        let decision = limit.evaluate(now, &[now]);
        assert!(matches!(decision, RateLimitDecision::Delay(_)));
    }

    #[test]
    fn rate_limit_drops_when_overflow_disallowed() {
        let limit = RateLimitConfig {
            max_executions: 1,
            window_seconds: 60,
            queue_overflow: false,
        };
        let now = Utc::now();
        assert_eq!(limit.evaluate(now, &[now]), RateLimitDecision::Drop);
    }
}
