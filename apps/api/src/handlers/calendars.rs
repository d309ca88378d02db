use axum::extract::{Path, State};
use axum::{Extension, Json};
use casare_core::{AppError, Principal};
use casare_domain::{
    BlackoutPeriod, BusinessCalendar, BusinessCalendarId, OutsideHoursPolicy, Permission,
    WeekdayHours, WorkflowId,
};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CalendarResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub timezone: String,
    pub weekday_hours: [WeekdayHoursDto; 7],
    pub weekend_policy: &'static str,
    pub outside_hours_policy: &'static str,
    pub holidays: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeekdayHoursDto {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl From<BusinessCalendar> for CalendarResponse {
    fn from(calendar: BusinessCalendar) -> Self {
        let weekday_hours = (*calendar.weekday_hours()).map(|hours| WeekdayHoursDto {
            enabled: hours.enabled,
            start: hours.start,
            end: hours.end,
        });

        Self {
            id: calendar.id().as_uuid(),
            tenant_id: calendar.tenant_id().as_uuid(),
            name: calendar.name().to_owned(),
            timezone: calendar.timezone().to_owned(),
            weekday_hours,
            weekend_policy: calendar.weekend_policy().as_str(),
            outside_hours_policy: calendar.outside_hours_policy().as_str(),
            holidays: calendar.holidays().to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCalendarRequest {
    pub name: String,
    pub timezone: String,
    pub weekday_hours: [WeekdayHoursDto; 7],
    pub weekend_policy: String,
    pub outside_hours_policy: String,
    #[serde(default)]
    pub holidays: Vec<DateTime<Utc>>,
}

/// `POST /calendars`
pub async fn create_calendar_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateCalendarRequest>,
) -> ApiResult<Json<CalendarResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleWrite)?;

    let mut weekday_hours = [WeekdayHours { enabled: false, start: NaiveTime::MIN, end: NaiveTime::MIN }; 7];
    for (slot, dto) in weekday_hours.iter_mut().zip(payload.weekday_hours.into_iter()) {
        *slot = WeekdayHours::new(dto.enabled, dto.start, dto.end)?;
    }

    let calendar = BusinessCalendar::new(
        principal.tenant_id(),
        payload.name,
        payload.timezone,
        weekday_hours,
        OutsideHoursPolicy::parse(&payload.weekend_policy)?,
        OutsideHoursPolicy::parse(&payload.outside_hours_policy)?,
        payload.holidays,
    )?;

    let calendar = state.calendars.create(calendar).await?;
    Ok(Json(calendar.into()))
}

/// `GET /calendars`
pub async fn list_calendars_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<CalendarResponse>>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleRead)?;

    let calendars = state.calendars.list(principal.tenant_id()).await?;
    Ok(Json(calendars.into_iter().map(CalendarResponse::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct BlackoutResponse {
    pub id: Uuid,
    pub calendar_id: Uuid,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub recurring: bool,
    pub affected_workflows: Vec<Uuid>,
}

impl From<BlackoutPeriod> for BlackoutResponse {
    fn from(blackout: BlackoutPeriod) -> Self {
        Self {
            id: blackout.id().as_uuid(),
            calendar_id: blackout.calendar_id().as_uuid(),
            name: blackout.name().to_owned(),
            start: blackout.start(),
            end: blackout.end(),
            recurring: blackout.is_recurring(),
            affected_workflows: blackout.affected_workflows().iter().map(|id| id.as_uuid()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBlackoutRequest {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub affected_workflows: Vec<Uuid>,
}

/// `POST /calendars/:calendar_id/blackouts`
pub async fn add_blackout_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(calendar_id): Path<Uuid>,
    Json(payload): Json<CreateBlackoutRequest>,
) -> ApiResult<Json<BlackoutResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleWrite)?;

    let calendar_id = BusinessCalendarId::from_uuid(calendar_id);
    state
        .calendars
        .find(calendar_id)
        .await?
        .filter(|calendar| calendar.tenant_id() == principal.tenant_id())
        .ok_or_else(|| AppError::NotFound(format!("calendar '{calendar_id}' not found")))?;

    let blackout = BlackoutPeriod::new(
        calendar_id,
        payload.name,
        payload.start,
        payload.end,
        payload.recurring,
        payload.affected_workflows.into_iter().map(WorkflowId::from_uuid).collect(),
    )?;

    let blackout = state.calendars.add_blackout(blackout).await?;
    Ok(Json(blackout.into()))
}

/// `GET /calendars/:calendar_id/blackouts`
pub async fn list_blackouts_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(calendar_id): Path<Uuid>,
) -> ApiResult<Json<Vec<BlackoutResponse>>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleRead)?;

    let calendar_id = BusinessCalendarId::from_uuid(calendar_id);
    state
        .calendars
        .find(calendar_id)
        .await?
        .filter(|calendar| calendar.tenant_id() == principal.tenant_id())
        .ok_or_else(|| AppError::NotFound(format!("calendar '{calendar_id}' not found")))?;

    let blackouts = state.calendars.list_blackouts(calendar_id).await?;
    Ok(Json(blackouts.into_iter().map(BlackoutResponse::from).collect()))
}
