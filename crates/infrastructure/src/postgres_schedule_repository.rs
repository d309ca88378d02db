//! PostgreSQL-backed schedule, dependency graph, and execution history
//! repository, grounded on the teacher's `postgres_workflow_repository.rs`
//! row-mapping conventions and transactional activation pattern.

use async_trait::async_trait;
use casare_application::ScheduleRepository;
use casare_core::{AppError, AppResult, NonEmptyString, TenantId};
use casare_domain::{
    DependencyCompletion, DependencyEdge, ExecutionHistoryRecord, JobId, RobotId, Schedule,
    ScheduleId, ScheduleStatus, ScheduleType,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for schedules and their dependency and
/// history sub-records.
#[derive(Clone)]
pub struct PostgresScheduleRepository {
    pool: PgPool,
}

impl PostgresScheduleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    workflow_id: uuid::Uuid,
    name: String,
    schedule_type: serde_json::Value,
    timezone: String,
    calendar_id: Option<uuid::Uuid>,
    priority: i16,
    variables: serde_json::Value,
    status: String,
    respect_business_hours: bool,
    next_run: Option<DateTime<Utc>>,
}

impl ScheduleRow {
    fn into_schedule(self) -> AppResult<Schedule> {
        let schedule_type: ScheduleType = serde_json::from_value(self.schedule_type)
            .map_err(|error| AppError::Internal(format!("invalid stored schedule_type: {error}")))?;

        Ok(Schedule::from_parts(
            ScheduleId::from_uuid(self.id),
            TenantId::from_uuid(self.tenant_id),
            casare_domain::WorkflowId::from_uuid(self.workflow_id),
            NonEmptyString::new(self.name)?,
            schedule_type,
            self.timezone,
            self.calendar_id.map(casare_domain::BusinessCalendarId::from_uuid),
            u8::try_from(self.priority)
                .map_err(|error| AppError::Internal(format!("invalid stored priority: {error}")))?,
            self.variables,
            ScheduleStatus::parse(self.status.as_str())?,
            self.respect_business_hours,
            self.next_run,
        ))
    }
}

#[derive(Debug, FromRow)]
struct DependencyEdgeRow {
    schedule_id: uuid::Uuid,
    depends_on: uuid::Uuid,
    wait_for_all: bool,
    require_success: bool,
    timeout_seconds: i64,
    priority_order: i32,
}

impl DependencyEdgeRow {
    fn into_edge(self) -> AppResult<DependencyEdge> {
        Ok(DependencyEdge::from_parts(
            ScheduleId::from_uuid(self.schedule_id),
            ScheduleId::from_uuid(self.depends_on),
            self.wait_for_all,
            self.require_success,
            u64::try_from(self.timeout_seconds)
                .map_err(|error| AppError::Internal(format!("invalid timeout_seconds: {error}")))?,
            self.priority_order,
        ))
    }
}

#[derive(Debug, FromRow)]
struct DependencyCompletionRow {
    schedule_id: uuid::Uuid,
    completed_at: DateTime<Utc>,
    success: bool,
    expires_at: DateTime<Utc>,
}

impl DependencyCompletionRow {
    fn into_completion(self) -> DependencyCompletion {
        DependencyCompletion::new(
            ScheduleId::from_uuid(self.schedule_id),
            self.completed_at,
            self.success,
            self.expires_at,
        )
    }
}

#[derive(Debug, FromRow)]
struct ExecutionHistoryRow {
    schedule_id: uuid::Uuid,
    scheduled_time: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    success: Option<bool>,
    error_message: Option<String>,
    robot_id: Option<uuid::Uuid>,
    job_id: Option<uuid::Uuid>,
    catch_up: bool,
}

impl ExecutionHistoryRow {
    fn into_record(self) -> ExecutionHistoryRecord {
        ExecutionHistoryRecord::from_parts(
            ScheduleId::from_uuid(self.schedule_id),
            self.scheduled_time,
            self.started_at,
            self.completed_at,
            self.success,
            self.error_message,
            self.robot_id.map(RobotId::from_uuid),
            self.job_id.map(JobId::from_uuid),
            self.catch_up,
        )
    }
}

#[async_trait]
impl ScheduleRepository for PostgresScheduleRepository {
    async fn create(&self, schedule: Schedule) -> AppResult<Schedule> {
        let schedule_type = serde_json::to_value(schedule.schedule_type())
            .map_err(|error| AppError::Internal(format!("failed to serialize schedule_type: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO advanced_schedules (
                id, tenant_id, workflow_id, name, schedule_type, timezone, calendar_id,
                priority, variables, status, respect_business_hours, next_run
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(schedule.id().as_uuid())
        .bind(schedule.tenant_id().as_uuid())
        .bind(schedule.workflow_id().as_uuid())
        .bind(schedule.name())
        .bind(&schedule_type)
        .bind(schedule.timezone())
        .bind(schedule.calendar_id().map(|id| id.as_uuid()))
        .bind(i16::from(schedule.priority()))
        .bind(schedule.variables())
        .bind(schedule.status().as_str())
        .bind(schedule.respects_business_hours())
        .bind(schedule.next_run())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create schedule: {error}")))?;

        Ok(schedule)
    }

    async fn find(&self, schedule_id: ScheduleId) -> AppResult<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(
            r#"SELECT * FROM advanced_schedules WHERE id = $1"#,
        )
        .bind(schedule_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load schedule: {error}")))?;

        row.map(ScheduleRow::into_schedule).transpose()
    }

    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<Schedule>> {
        let mut transaction = crate::begin_tenant_scoped(&self.pool, tenant_id).await?;

        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"SELECT * FROM advanced_schedules WHERE tenant_id = $1 ORDER BY name ASC"#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list schedules: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit tenant-scoped transaction: {error}"))
        })?;

        rows.into_iter().map(ScheduleRow::into_schedule).collect()
    }

    async fn find_due(&self, at: DateTime<Utc>) -> AppResult<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT * FROM advanced_schedules
            WHERE status = 'active' AND next_run IS NOT NULL AND next_run <= $1
            ORDER BY next_run ASC
            "#,
        )
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load due schedules: {error}")))?;

        rows.into_iter().map(ScheduleRow::into_schedule).collect()
    }

    async fn update(&self, schedule: Schedule) -> AppResult<Schedule> {
        let affected = sqlx::query(
            r#"
            UPDATE advanced_schedules
            SET status = $2, next_run = $3
            WHERE id = $1
            "#,
        )
        .bind(schedule.id().as_uuid())
        .bind(schedule.status().as_str())
        .bind(schedule.next_run())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update schedule: {error}")))?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound(format!(
                "schedule '{}' not found",
                schedule.id()
            )));
        }

        Ok(schedule)
    }

    async fn add_dependency_edge(&self, edge: DependencyEdge) -> AppResult<DependencyEdge> {
        sqlx::query(
            r#"
            INSERT INTO schedule_dependencies (
                schedule_id, depends_on, wait_for_all, require_success, timeout_seconds, priority_order
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(edge.schedule_id().as_uuid())
        .bind(edge.depends_on().as_uuid())
        .bind(edge.wait_for_all())
        .bind(edge.require_success())
        .bind(i64::try_from(edge.timeout_seconds())
            .map_err(|error| AppError::Validation(format!("invalid timeout_seconds: {error}")))?)
        .bind(edge.priority_order())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to add dependency edge: {error}")))?;

        Ok(edge)
    }

    async fn list_dependency_edges(&self, tenant_id: TenantId) -> AppResult<Vec<DependencyEdge>> {
        let rows = sqlx::query_as::<_, DependencyEdgeRow>(
            r#"
            SELECT schedule_dependencies.*
            FROM schedule_dependencies
            INNER JOIN advanced_schedules ON advanced_schedules.id = schedule_dependencies.schedule_id
            WHERE advanced_schedules.tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list dependency edges: {error}")))?;

        rows.into_iter().map(DependencyEdgeRow::into_edge).collect()
    }

    async fn remove_dependency_edge(
        &self,
        schedule_id: ScheduleId,
        depends_on: ScheduleId,
    ) -> AppResult<()> {
        sqlx::query(
            r#"DELETE FROM schedule_dependencies WHERE schedule_id = $1 AND depends_on = $2"#,
        )
        .bind(schedule_id.as_uuid())
        .bind(depends_on.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to remove dependency edge: {error}")))?;

        Ok(())
    }

    async fn record_completion(&self, completion: DependencyCompletion) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dependency_completions (schedule_id, completed_at, success, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(completion.schedule_id().as_uuid())
        .bind(completion.completed_at())
        .bind(completion.success())
        .bind(completion.expires_at())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to record dependency completion: {error}")))?;

        Ok(())
    }

    async fn find_completions(
        &self,
        upstream: &[ScheduleId],
        now: DateTime<Utc>,
    ) -> AppResult<Vec<DependencyCompletion>> {
        let upstream_ids: Vec<uuid::Uuid> = upstream.iter().map(|id| id.as_uuid()).collect();

        let rows = sqlx::query_as::<_, DependencyCompletionRow>(
            r#"
            SELECT * FROM dependency_completions
            WHERE schedule_id = ANY($1) AND expires_at > $2
            ORDER BY completed_at DESC
            "#,
        )
        .bind(&upstream_ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load dependency completions: {error}")))?;

        Ok(rows.into_iter().map(DependencyCompletionRow::into_completion).collect())
    }

    async fn append_history(&self, record: ExecutionHistoryRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schedule_execution_history (
                schedule_id, scheduled_time, started_at, completed_at, success,
                error_message, robot_id, job_id, catch_up
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.schedule_id().as_uuid())
        .bind(record.scheduled_time())
        .bind(record.started_at())
        .bind(record.completed_at())
        .bind(record.success())
        .bind(record.error_message())
        .bind(record.robot_id().map(|id| id.as_uuid()))
        .bind(record.job_id().map(|id| id.as_uuid()))
        .bind(record.is_catch_up())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append execution history: {error}")))?;

        Ok(())
    }

    async fn recent_history(
        &self,
        schedule_id: ScheduleId,
        limit: u32,
    ) -> AppResult<Vec<ExecutionHistoryRecord>> {
        let rows = sqlx::query_as::<_, ExecutionHistoryRow>(
            r#"
            SELECT * FROM schedule_execution_history
            WHERE schedule_id = $1
            ORDER BY scheduled_time DESC
            LIMIT $2
            "#,
        )
        .bind(schedule_id.as_uuid())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load execution history: {error}")))?;

        Ok(rows.into_iter().map(ExecutionHistoryRow::into_record).collect())
    }

    async fn recent_fire_times(
        &self,
        schedule_id: ScheduleId,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<DateTime<Utc>>> {
        let times = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT scheduled_time FROM schedule_execution_history
            WHERE schedule_id = $1 AND scheduled_time >= $2
            ORDER BY scheduled_time ASC
            "#,
        )
        .bind(schedule_id.as_uuid())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load recent fire times: {error}")))?;

        Ok(times)
    }
}
