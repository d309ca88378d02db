//! Trigger evaluation: computing next-fire times, gating a due fire
//! through calendar, dependency, rate-limit, and condition checks in a
//! fixed order, and replaying missed fires after downtime.
//!
//! New subsystem (the teacher has no scheduler); the gate pipeline is
//! grounded on the `Schedule`/`SlaConfig`/`RateLimitConfig` pure evaluation
//! methods already defined in `casare_domain::schedule`, composed here with
//! the I/O the domain layer cannot perform itself.

use std::sync::Arc;

use async_trait::async_trait;
use casare_core::{AppError, AppResult, TenantId};
use casare_domain::{
    BlackoutPeriod, BusinessCalendar, ConditionConfig, DependencyCompletion, DependencyEdge,
    ExecutionHistoryRecord, RateLimitConfig, RateLimitDecision, Schedule, ScheduleId, ScheduleType,
    SlaConfig, SlaStatus, WorkflowId,
};
use chrono::{DateTime, Utc};

use crate::ports::{CalendarRepository, RateLimitRepository, ScheduleRepository};

/// Computes the next fire time for a trigger configuration in a given
/// timezone. Isolated behind a port so the application layer stays free of
/// a direct dependency on the `cron` crate's expression parser.
#[async_trait]
pub trait NextFireCalculator: Send + Sync {
    /// Returns the next fire instant strictly after `after`, or `None` if
    /// the trigger will never fire again (e.g. a `one_time` schedule whose
    /// instant has passed).
    fn next_fire(
        &self,
        schedule_type: &ScheduleType,
        timezone: &str,
        after: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>>;
}

/// Evaluates a runtime condition gate. Isolated behind a port since
/// evaluating a `SqlQuery`/`HttpCheck`/`FileExists` condition requires I/O
/// the application layer does not perform directly.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// Returns `true` if `condition` currently permits the fire to
    /// proceed.
    async fn evaluate(&self, condition: &ConditionConfig) -> AppResult<bool>;
}

/// Why a due fire was not allowed to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressReason {
    /// The schedule is not `Active` (paused, disabled, completed, error).
    NotActive,
    /// The calendar's business-hours policy denied the fire.
    OutsideBusinessHours,
    /// The fire falls within an active blackout period covering this
    /// schedule's workflow.
    Blackout,
    /// The schedule's upstream dependencies have not resolved within the
    /// gate's timeout.
    DependencyUnresolved,
    /// The schedule's upstream dependencies resolved, but
    /// `require_success` was set and at least one upstream failed.
    DependencyFailed,
    /// The configured condition gate returned `false`.
    ConditionNotMet,
    /// The rate limit dropped the fire.
    RateLimited,
}

/// The outcome of evaluating whether a schedule may fire now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireDecision {
    /// The fire proceeds now.
    Fire,
    /// The fire is deferred to the given instant (rate-limit overflow
    /// queuing).
    Delay(DateTime<Utc>),
    /// The fire is suppressed for the given reason and should not be
    /// retried until the schedule's next computed `next_run`.
    Suppressed(SuppressReason),
}

/// Application service for the schedule engine: trigger evaluation,
/// dependency graph maintenance, and catch-up replay.
#[derive(Clone)]
pub struct ScheduleEngineService {
    schedules: Arc<dyn ScheduleRepository>,
    calendars: Arc<dyn CalendarRepository>,
    rate_limits: Arc<dyn RateLimitRepository>,
    next_fire: Arc<dyn NextFireCalculator>,
    conditions: Arc<dyn ConditionEvaluator>,
}

impl ScheduleEngineService {
    /// Creates a new schedule engine service.
    #[must_use]
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        calendars: Arc<dyn CalendarRepository>,
        rate_limits: Arc<dyn RateLimitRepository>,
        next_fire: Arc<dyn NextFireCalculator>,
        conditions: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        Self {
            schedules,
            calendars,
            rate_limits,
            next_fire,
            conditions,
        }
    }

    /// Creates a new schedule, computing its initial `next_run`.
    pub async fn create(&self, mut schedule: Schedule) -> AppResult<Schedule> {
        let next_run = self
            .next_fire
            .next_fire(schedule.schedule_type(), schedule.timezone(), Utc::now())?;
        schedule.set_next_run(next_run);
        self.schedules.create(schedule).await
    }

    /// Returns a schedule by id.
    pub async fn find(&self, schedule_id: ScheduleId) -> AppResult<Option<Schedule>> {
        self.schedules.find(schedule_id).await
    }

    /// Lists schedules for a tenant.
    pub async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<Schedule>> {
        self.schedules.list(tenant_id).await
    }

    /// Returns every schedule due for evaluation at or before `at`.
    pub async fn find_due(&self, at: DateTime<Utc>) -> AppResult<Vec<Schedule>> {
        self.schedules.find_due(at).await
    }

    /// Loads a schedule's business calendar, if it has one configured.
    pub async fn load_calendar(
        &self,
        schedule: &Schedule,
    ) -> AppResult<Option<BusinessCalendar>> {
        match schedule.calendar_id() {
            Some(calendar_id) => self.calendars.find(calendar_id).await,
            None => Ok(None),
        }
    }

    /// Loads the blackout periods owned by a calendar, for the gate check
    /// in `evaluate_fire`.
    pub async fn load_blackouts(
        &self,
        calendar: &BusinessCalendar,
    ) -> AppResult<Vec<BlackoutPeriod>> {
        self.calendars.list_blackouts(calendar.id()).await
    }

    /// Evaluates whether `schedule` may fire now, applying gates in a
    /// fixed order: operational status and business calendar (together,
    /// `can_execute`), rate limit, condition, then dependency resolution.
    /// The first gate to suppress short-circuits the remaining ones.
    pub async fn evaluate_fire(
        &self,
        schedule: &Schedule,
        workflow_id: WorkflowId,
        calendar: Option<&BusinessCalendar>,
        blackouts: &[BlackoutPeriod],
        condition: Option<(&ConditionConfig, u32)>,
        rate_limit: Option<&RateLimitConfig>,
        now: DateTime<Utc>,
    ) -> AppResult<FireDecision> {
        if !schedule.can_execute() {
            return Ok(FireDecision::Suppressed(SuppressReason::NotActive));
        }

        if blackouts
            .iter()
            .any(|blackout| blackout.affects(workflow_id) && blackout.covers(now))
        {
            return Ok(FireDecision::Suppressed(SuppressReason::Blackout));
        }

        if schedule.respects_business_hours() {
            if let Some(calendar) = calendar {
                if !calendar.is_working_time(now) {
                    return Ok(FireDecision::Suppressed(SuppressReason::OutsideBusinessHours));
                }
            }
        }

        if let Some(rate_limit) = rate_limit {
            let key = format!("schedule-rate-limit:{}", schedule.id());
            let recent = self
                .rate_limits
                .record_and_window(&key, now, rate_limit.window_seconds)
                .await?;

            match rate_limit.evaluate(now, &recent) {
                RateLimitDecision::Allow => {}
                RateLimitDecision::Delay(at) => return Ok(FireDecision::Delay(at)),
                RateLimitDecision::Drop => {
                    return Ok(FireDecision::Suppressed(SuppressReason::RateLimited))
                }
            }
        }

        if let Some((condition, _max_retries)) = condition {
            if !self.conditions.evaluate(condition).await? {
                return Ok(FireDecision::Suppressed(SuppressReason::ConditionNotMet));
            }
        }

        if let ScheduleType::Dependency {
            upstream,
            wait_for_all,
            timeout_seconds: _,
            require_success,
        } = schedule.schedule_type()
        {
            let completions = self.schedules.find_completions(upstream, now).await?;
            match dependency_gate(upstream, *wait_for_all, *require_success, &completions) {
                FireDecision::Fire => {}
                other => return Ok(other),
            }
        }

        Ok(FireDecision::Fire)
    }

    /// Advances `schedule.next_run` after a fire (or suppression), then
    /// persists the update.
    pub async fn advance(&self, mut schedule: Schedule, from: DateTime<Utc>) -> AppResult<Schedule> {
        let next_run = self
            .next_fire
            .next_fire(schedule.schedule_type(), schedule.timezone(), from)?;
        schedule.set_next_run(next_run);
        self.schedules.update(schedule).await
    }

    /// Adds a dependency edge after verifying it introduces no cycle in
    /// the tenant's dependency graph, walking the existing edge set with a
    /// depth-first search from the new edge's upstream node back to its
    /// dependent.
    pub async fn add_dependency_edge(
        &self,
        tenant_id: TenantId,
        edge: DependencyEdge,
    ) -> AppResult<DependencyEdge> {
        let existing = self.schedules.list_dependency_edges(tenant_id).await?;

        if would_cycle(&existing, edge.schedule_id(), edge.depends_on()) {
            return Err(AppError::DependencyCycle(format!(
                "adding edge '{}' -> '{}' would close a cycle",
                edge.schedule_id(),
                edge.depends_on()
            )));
        }

        self.schedules.add_dependency_edge(edge).await
    }

    /// Removes a dependency edge.
    pub async fn remove_dependency_edge(
        &self,
        schedule_id: ScheduleId,
        depends_on: ScheduleId,
    ) -> AppResult<()> {
        self.schedules.remove_dependency_edge(schedule_id, depends_on).await
    }

    /// Records a schedule's completion, resolving any dependents waiting on
    /// it.
    pub async fn record_completion(&self, completion: DependencyCompletion) -> AppResult<()> {
        self.schedules.record_completion(completion).await
    }

    /// Appends a fire's execution history record.
    pub async fn append_history(&self, record: ExecutionHistoryRecord) -> AppResult<()> {
        self.schedules.append_history(record).await
    }

    /// Computes current SLA status from a schedule's recent execution
    /// history.
    pub async fn sla_status(
        &self,
        schedule_id: ScheduleId,
        sla: &SlaConfig,
        lookback: u32,
    ) -> AppResult<SlaStatus> {
        let history = self.schedules.recent_history(schedule_id, lookback).await?;
        let finished: Vec<_> = history.iter().filter(|record| record.success().is_some()).collect();

        if finished.is_empty() {
            return Ok(SlaStatus::Ok);
        }

        let successes = finished.iter().filter(|record| record.success() == Some(true)).count();
        let success_rate = (successes as f32 / finished.len() as f32) * 100.0;

        let consecutive_failures = finished
            .iter()
            .take_while(|record| record.success() == Some(false))
            .count() as u32;

        Ok(sla.evaluate(success_rate, consecutive_failures))
    }

    /// Computes the scheduled instants missed while the engine was down,
    /// bounded by `catchup.max_catchup_runs` and
    /// `catchup.catchup_window_seconds`, oldest first.
    #[must_use]
    pub fn compute_catchup_fires(
        &self,
        schedule: &Schedule,
        last_known_run: DateTime<Utc>,
        now: DateTime<Utc>,
        max_catchup_runs: u32,
        catchup_window_seconds: u64,
    ) -> AppResult<Vec<DateTime<Utc>>> {
        let window_start = now - chrono::Duration::seconds(catchup_window_seconds as i64);
        let mut cursor = last_known_run.max(window_start);
        let mut missed = Vec::new();

        while missed.len() < max_catchup_runs as usize {
            let next = self
                .next_fire
                .next_fire(schedule.schedule_type(), schedule.timezone(), cursor)?;

            let Some(next) = next else { break };
            if next >= now {
                break;
            }

            missed.push(next);
            cursor = next;
        }

        Ok(missed)
    }
}

fn dependency_gate(
    upstream: &[ScheduleId],
    wait_for_all: bool,
    require_success: bool,
    completions: &[DependencyCompletion],
) -> FireDecision {
    let live: Vec<&DependencyCompletion> = completions.iter().collect();

    let resolved = |schedule_id: ScheduleId| live.iter().find(|c| c.schedule_id() == schedule_id);

    if wait_for_all {
        for &upstream_id in upstream {
            match resolved(upstream_id) {
                Some(completion) if require_success && !completion.success() => {
                    return FireDecision::Suppressed(SuppressReason::DependencyFailed);
                }
                Some(_) => {}
                None => return FireDecision::Suppressed(SuppressReason::DependencyUnresolved),
            }
        }
        FireDecision::Fire
    } else {
        let any_satisfied = upstream.iter().any(|&upstream_id| {
            resolved(upstream_id).is_some_and(|c| !require_success || c.success())
        });

        if any_satisfied {
            FireDecision::Fire
        } else {
            FireDecision::Suppressed(SuppressReason::DependencyUnresolved)
        }
    }
}

/// Returns `true` if adding an edge `schedule_id -> depends_on` would close
/// a cycle, i.e. `schedule_id` is already reachable from `depends_on` by
/// following existing edges forward.
fn would_cycle(existing: &[DependencyEdge], schedule_id: ScheduleId, depends_on: ScheduleId) -> bool {
    let mut stack = vec![depends_on];
    let mut visited = std::collections::HashSet::new();

    while let Some(node) = stack.pop() {
        if node == schedule_id {
            return true;
        }

        if !visited.insert(node) {
            continue;
        }

        for edge in existing.iter().filter(|edge| edge.schedule_id() == node) {
            stack.push(edge.depends_on());
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_reference_is_a_cycle() {
        let id = ScheduleId::new();
        assert!(would_cycle(&[], id, id));
    }

    #[test]
    fn transitive_cycle_is_detected() {
        let a = ScheduleId::new();
        let b = ScheduleId::new();
        let c = ScheduleId::new();

        // existing: c depends_on b, b depends_on a
        let edges = vec![
            DependencyEdge::new(c, b, true, false, 60, 0).unwrap(),
            DependencyEdge::new(b, a, true, false, 60, 0).unwrap(),
        ];

        // adding a -> c would close the cycle a -> c -> b -> a
        assert!(would_cycle(&edges, a, c));
    }

    #[test]
    fn unrelated_edge_is_not_a_cycle() {
        let a = ScheduleId::new();
        let b = ScheduleId::new();
        let c = ScheduleId::new();
        let edges = vec![DependencyEdge::new(b, a, true, false, 60, 0).unwrap()];
        assert!(!would_cycle(&edges, c, a));
    }

    #[test]
    fn wait_for_all_suppresses_until_every_upstream_resolves() {
        let a = ScheduleId::new();
        let b = ScheduleId::new();
        let now = Utc::now();
        let completions = vec![DependencyCompletion::new(a, now, true, now + chrono::Duration::minutes(5))];

        let decision = dependency_gate(&[a, b], true, false, &completions);
        assert_eq!(decision, FireDecision::Suppressed(SuppressReason::DependencyUnresolved));
    }

    #[test]
    fn any_mode_fires_on_first_success() {
        let a = ScheduleId::new();
        let b = ScheduleId::new();
        let now = Utc::now();
        let completions = vec![DependencyCompletion::new(a, now, true, now + chrono::Duration::minutes(5))];

        let decision = dependency_gate(&[a, b], false, true, &completions);
        assert_eq!(decision, FireDecision::Fire);
    }

    #[test]
    fn require_success_rejects_failed_completion_in_wait_for_all_mode() {
        let a = ScheduleId::new();
        let now = Utc::now();
        let completions = vec![DependencyCompletion::new(a, now, false, now + chrono::Duration::minutes(5))];

        let decision = dependency_gate(&[a], true, true, &completions);
        assert_eq!(decision, FireDecision::Suppressed(SuppressReason::DependencyFailed));
    }
}
