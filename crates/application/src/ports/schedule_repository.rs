use async_trait::async_trait;
use casare_core::{AppResult, TenantId};
use casare_domain::{
    DependencyCompletion, DependencyEdge, ExecutionHistoryRecord, Schedule, ScheduleId,
};
use chrono::{DateTime, Utc};

/// Repository port for schedules and their dependency/history sub-records.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Persists a newly created schedule.
    async fn create(&self, schedule: Schedule) -> AppResult<Schedule>;

    /// Returns a schedule by id.
    async fn find(&self, schedule_id: ScheduleId) -> AppResult<Option<Schedule>>;

    /// Lists schedules for a tenant.
    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<Schedule>>;

    /// Returns every schedule due to be evaluated at or before `at`
    /// (`next_run <= at`) across every tenant, for the schedule ticker.
    async fn find_due(&self, at: DateTime<Utc>) -> AppResult<Vec<Schedule>>;

    /// Persists an updated schedule (status, `next_run`).
    async fn update(&self, schedule: Schedule) -> AppResult<Schedule>;

    /// Inserts a dependency edge. The caller must have already verified no
    /// cycle would be introduced; the repository additionally relies on a
    /// database trigger as defense in depth.
    async fn add_dependency_edge(&self, edge: DependencyEdge) -> AppResult<DependencyEdge>;

    /// Returns every dependency edge in the tenant's graph, for
    /// in-application cycle-detection walks.
    async fn list_dependency_edges(&self, tenant_id: TenantId) -> AppResult<Vec<DependencyEdge>>;

    /// Removes a dependency edge.
    async fn remove_dependency_edge(
        &self,
        schedule_id: ScheduleId,
        depends_on: ScheduleId,
    ) -> AppResult<()>;

    /// Records a schedule's completion for dependent schedules to consult.
    async fn record_completion(&self, completion: DependencyCompletion) -> AppResult<()>;

    /// Returns unexpired completions for the given upstream schedules.
    async fn find_completions(
        &self,
        upstream: &[ScheduleId],
        now: DateTime<Utc>,
    ) -> AppResult<Vec<DependencyCompletion>>;

    /// Appends an execution history record.
    async fn append_history(&self, record: ExecutionHistoryRecord) -> AppResult<()>;

    /// Returns the most recent execution history for a schedule, newest
    /// first, bounded to `limit` rows.
    async fn recent_history(
        &self,
        schedule_id: ScheduleId,
        limit: u32,
    ) -> AppResult<Vec<ExecutionHistoryRecord>>;

    /// Returns fire timestamps within the trailing window for rate-limit
    /// evaluation.
    async fn recent_fire_times(
        &self,
        schedule_id: ScheduleId,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<DateTime<Utc>>>;
}
