//! PostgreSQL-backed business calendar and blackout period repository,
//! grounded on the teacher's `postgres_tenant_repository.rs` row-mapping
//! conventions.

use async_trait::async_trait;
use casare_application::CalendarRepository;
use casare_core::{AppError, AppResult, NonEmptyString, TenantId};
use casare_domain::{
    BlackoutPeriod, BlackoutPeriodId, BusinessCalendar, BusinessCalendarId, OutsideHoursPolicy,
    WeekdayHours, WorkflowId,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for business calendars and blackout
/// periods.
#[derive(Clone)]
pub struct PostgresCalendarRepository {
    pool: PgPool,
}

impl PostgresCalendarRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CalendarRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    timezone: String,
    weekday_hours: serde_json::Value,
    weekend_policy: String,
    outside_hours_policy: String,
    holidays: Vec<DateTime<Utc>>,
}

impl CalendarRow {
    fn into_calendar(self) -> AppResult<BusinessCalendar> {
        let weekday_hours: Vec<WeekdayHours> = serde_json::from_value(self.weekday_hours)
            .map_err(|error| AppError::Internal(format!("invalid stored weekday_hours: {error}")))?;
        let weekday_hours: [WeekdayHours; 7] = weekday_hours.try_into().map_err(|_| {
            AppError::Internal("stored weekday_hours does not have exactly 7 entries".to_owned())
        })?;

        Ok(BusinessCalendar::from_parts(
            BusinessCalendarId::from_uuid(self.id),
            TenantId::from_uuid(self.tenant_id),
            NonEmptyString::new(self.name)?,
            self.timezone,
            weekday_hours,
            OutsideHoursPolicy::parse(self.weekend_policy.as_str())?,
            OutsideHoursPolicy::parse(self.outside_hours_policy.as_str())?,
            self.holidays,
        ))
    }
}

#[derive(Debug, FromRow)]
struct BlackoutRow {
    id: uuid::Uuid,
    calendar_id: uuid::Uuid,
    name: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    recurring: bool,
    affected_workflows: Vec<uuid::Uuid>,
}

impl BlackoutRow {
    fn into_blackout(self) -> AppResult<BlackoutPeriod> {
        Ok(BlackoutPeriod::from_parts(
            BlackoutPeriodId::from_uuid(self.id),
            BusinessCalendarId::from_uuid(self.calendar_id),
            NonEmptyString::new(self.name)?,
            self.start_time,
            self.end_time,
            self.recurring,
            self.affected_workflows.into_iter().map(WorkflowId::from_uuid).collect(),
        ))
    }
}

#[async_trait]
impl CalendarRepository for PostgresCalendarRepository {
    async fn create(&self, calendar: BusinessCalendar) -> AppResult<BusinessCalendar> {
        let weekday_hours = serde_json::to_value(calendar.weekday_hours())
            .map_err(|error| AppError::Internal(format!("failed to serialize weekday_hours: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO business_calendars (
                id, tenant_id, name, timezone, weekday_hours, weekend_policy,
                outside_hours_policy, holidays
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(calendar.id().as_uuid())
        .bind(calendar.tenant_id().as_uuid())
        .bind(calendar.name())
        .bind(calendar.timezone())
        .bind(&weekday_hours)
        .bind(calendar.weekend_policy().as_str())
        .bind(calendar.outside_hours_policy().as_str())
        .bind(calendar.holidays())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create business calendar: {error}")))?;

        Ok(calendar)
    }

    async fn find(&self, calendar_id: BusinessCalendarId) -> AppResult<Option<BusinessCalendar>> {
        let row = sqlx::query_as::<_, CalendarRow>(
            r#"SELECT * FROM business_calendars WHERE id = $1"#,
        )
        .bind(calendar_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load business calendar: {error}")))?;

        row.map(CalendarRow::into_calendar).transpose()
    }

    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<BusinessCalendar>> {
        let mut transaction = crate::begin_tenant_scoped(&self.pool, tenant_id).await?;

        let rows = sqlx::query_as::<_, CalendarRow>(
            r#"SELECT * FROM business_calendars WHERE tenant_id = $1 ORDER BY name ASC"#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list business calendars: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit tenant-scoped transaction: {error}"))
        })?;

        rows.into_iter().map(CalendarRow::into_calendar).collect()
    }

    async fn add_blackout(&self, blackout: BlackoutPeriod) -> AppResult<BlackoutPeriod> {
        let affected: Vec<uuid::Uuid> =
            blackout.affected_workflows().iter().map(|id| id.as_uuid()).collect();

        sqlx::query(
            r#"
            INSERT INTO blackout_periods (
                id, calendar_id, name, start_time, end_time, recurring, affected_workflows
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(blackout.id().as_uuid())
        .bind(blackout.calendar_id().as_uuid())
        .bind(blackout.name())
        .bind(blackout.start())
        .bind(blackout.end())
        .bind(blackout.is_recurring())
        .bind(&affected)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to add blackout period: {error}")))?;

        Ok(blackout)
    }

    async fn list_blackouts(
        &self,
        calendar_id: BusinessCalendarId,
    ) -> AppResult<Vec<BlackoutPeriod>> {
        let rows = sqlx::query_as::<_, BlackoutRow>(
            r#"SELECT * FROM blackout_periods WHERE calendar_id = $1 ORDER BY start_time ASC"#,
        )
        .bind(calendar_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list blackout periods: {error}")))?;

        rows.into_iter().map(BlackoutRow::into_blackout).collect()
    }
}
