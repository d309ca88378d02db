use axum::extract::{Path, State};
use axum::{Extension, Json};
use casare_core::AppError;
use casare_core::Principal;
use casare_domain::{
    ActorRef, AuditAction, BusinessCalendarId, DependencyEdge, Permission, ResourceRef, Schedule,
    ScheduleId, ScheduleType, WorkflowId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub schedule_type: ScheduleType,
    pub timezone: String,
    pub calendar_id: Option<Uuid>,
    pub priority: u8,
    pub variables: Value,
    pub status: &'static str,
    pub respects_business_hours: bool,
    pub next_run: Option<chrono::DateTime<Utc>>,
}

impl From<Schedule> for ScheduleResponse {
    fn from(schedule: Schedule) -> Self {
        Self {
            id: schedule.id().as_uuid(),
            tenant_id: schedule.tenant_id().as_uuid(),
            workflow_id: schedule.workflow_id().as_uuid(),
            name: schedule.name().to_owned(),
            schedule_type: schedule.schedule_type().clone(),
            timezone: schedule.timezone().to_owned(),
            calendar_id: schedule.calendar_id().map(|id| id.as_uuid()),
            priority: schedule.priority(),
            variables: schedule.variables().clone(),
            status: schedule.status().as_str(),
            respects_business_hours: schedule.respects_business_hours(),
            next_run: schedule.next_run(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub workflow_id: Uuid,
    pub name: String,
    pub schedule_type: ScheduleType,
    pub timezone: String,
    pub calendar_id: Option<Uuid>,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub variables: Value,
    #[serde(default)]
    pub respect_business_hours: bool,
}

/// `POST /schedules`
pub async fn create_schedule_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateScheduleRequest>,
) -> ApiResult<Json<ScheduleResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleWrite)?;

    let schedule = Schedule::new(
        principal.tenant_id(),
        WorkflowId::from_uuid(payload.workflow_id),
        payload.name,
        payload.schedule_type,
        payload.timezone,
        payload.calendar_id.map(BusinessCalendarId::from_uuid),
        payload.priority,
        payload.variables,
        payload.respect_business_hours,
    )?;

    let schedule = state.schedules.create(schedule).await?;

    state
        .audit_log
        .record(
            Utc::now(),
            AuditAction::ScheduleFired,
            ActorRef::User { id: principal.subject().to_owned() },
            ResourceRef {
                resource_type: "schedule".to_owned(),
                resource_id: schedule.id().to_string(),
            },
            Some(principal.tenant_id()),
            Value::Null,
            None,
            None,
        )
        .await?;

    Ok(Json(schedule.into()))
}

/// `GET /schedules/:schedule_id`
pub async fn get_schedule_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(schedule_id): Path<Uuid>,
) -> ApiResult<Json<ScheduleResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleRead)?;

    let schedule_id = ScheduleId::from_uuid(schedule_id);
    let schedule = state
        .schedules
        .find(schedule_id)
        .await?
        .filter(|schedule| schedule.tenant_id() == principal.tenant_id())
        .ok_or_else(|| AppError::NotFound(format!("schedule '{schedule_id}' not found")))?;

    Ok(Json(schedule.into()))
}

/// `GET /schedules`
pub async fn list_schedules_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<ScheduleResponse>>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleRead)?;

    let schedules = state.schedules.list(principal.tenant_id()).await?;
    Ok(Json(schedules.into_iter().map(ScheduleResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateDependencyEdgeRequest {
    pub schedule_id: Uuid,
    pub depends_on: Uuid,
    #[serde(default)]
    pub wait_for_all: bool,
    #[serde(default)]
    pub require_success: bool,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub priority_order: i32,
}

#[derive(Debug, Serialize)]
pub struct DependencyEdgeResponse {
    pub schedule_id: Uuid,
    pub depends_on: Uuid,
    pub wait_for_all: bool,
    pub require_success: bool,
    pub timeout_seconds: u64,
    pub priority_order: i32,
}

impl From<DependencyEdge> for DependencyEdgeResponse {
    fn from(edge: DependencyEdge) -> Self {
        Self {
            schedule_id: edge.schedule_id().as_uuid(),
            depends_on: edge.depends_on().as_uuid(),
            wait_for_all: edge.wait_for_all(),
            require_success: edge.require_success(),
            timeout_seconds: edge.timeout_seconds(),
            priority_order: edge.priority_order(),
        }
    }
}

/// `POST /schedules/dependencies`
pub async fn add_dependency_edge_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateDependencyEdgeRequest>,
) -> ApiResult<Json<DependencyEdgeResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleWrite)?;

    let edge = DependencyEdge::new(
        ScheduleId::from_uuid(payload.schedule_id),
        ScheduleId::from_uuid(payload.depends_on),
        payload.wait_for_all,
        payload.require_success,
        payload.timeout_seconds,
        payload.priority_order,
    )?;

    let edge = state.schedules.add_dependency_edge(principal.tenant_id(), edge).await?;

    Ok(Json(edge.into()))
}

/// `DELETE /schedules/:schedule_id/dependencies/:depends_on`
pub async fn remove_dependency_edge_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((schedule_id, depends_on)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<()>> {
    state.tenant_gateway.authorize(&principal, Permission::ScheduleWrite)?;

    state
        .schedules
        .remove_dependency_edge(ScheduleId::from_uuid(schedule_id), ScheduleId::from_uuid(depends_on))
        .await?;

    Ok(Json(()))
}
