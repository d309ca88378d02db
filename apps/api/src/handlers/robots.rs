use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use casare_core::{AppError, Principal};
use casare_domain::{
    ActorRef, AuditAction, Capability, Heartbeat, JobId, Permission, ResourceRef, Robot, RobotId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RobotResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub hostname: String,
    pub capabilities: Vec<String>,
    pub status: &'static str,
    pub current_jobs: BTreeSet<Uuid>,
    pub max_concurrent: u32,
    pub last_seen: chrono::DateTime<Utc>,
}

impl From<Robot> for RobotResponse {
    fn from(robot: Robot) -> Self {
        Self {
            id: robot.id().as_uuid(),
            tenant_id: robot.tenant_id().as_uuid(),
            name: robot.name().to_owned(),
            hostname: robot.hostname().to_owned(),
            capabilities: robot.capabilities().iter().map(Capability::as_storage_string).collect(),
            status: robot.status().as_str(),
            current_jobs: robot.current_jobs().iter().map(|id| id.as_uuid()).collect(),
            max_concurrent: robot.max_concurrent(),
            last_seen: robot.last_seen(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRobotRequest {
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub max_concurrent: u32,
}

/// `POST /robots`
pub async fn register_robot_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<RegisterRobotRequest>,
) -> ApiResult<Json<RobotResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::RobotCreate)?;

    let capabilities: BTreeSet<Capability> =
        payload.capabilities.iter().map(|value| Capability::parse(value)).collect();

    let robot = Robot::register(
        principal.tenant_id(),
        payload.name,
        payload.hostname,
        capabilities,
        payload.max_concurrent,
        Utc::now(),
    )?;
    let robot = state.robots.register(robot).await?;

    state
        .audit_log
        .record(
            Utc::now(),
            AuditAction::RobotRegistered,
            ActorRef::User { id: principal.subject().to_owned() },
            ResourceRef { resource_type: "robot".to_owned(), resource_id: robot.id().to_string() },
            Some(principal.tenant_id()),
            Value::Null,
            None,
            None,
        )
        .await?;

    Ok(Json(robot.into()))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub job_id: Option<Uuid>,
    pub progress_percent: Option<u8>,
    pub current_node_id: Option<String>,
    #[serde(default)]
    pub memory_bytes: u64,
    #[serde(default)]
    pub cpu_percent: f32,
}

/// `POST /robots/:robot_id/heartbeat`
pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(robot_id): Path<Uuid>,
    Json(payload): Json<HeartbeatRequest>,
) -> ApiResult<Json<()>> {
    state.tenant_gateway.authorize(&principal, Permission::RobotRead)?;

    let robot_id = RobotId::from_uuid(robot_id);
    find_owned_robot(&state, &principal, robot_id).await?;

    let heartbeat = Heartbeat::new(
        robot_id,
        payload.job_id.map(JobId::from_uuid),
        payload.progress_percent,
        payload.current_node_id,
        payload.memory_bytes,
        payload.cpu_percent,
        Utc::now(),
    )?;
    state.robots.record_heartbeat(heartbeat).await?;

    Ok(Json(()))
}

#[derive(Debug, Deserialize)]
pub struct DeregisterRobotRequest {
    #[serde(default = "default_deregister_reason")]
    pub reason: String,
}

fn default_deregister_reason() -> String {
    "deregistered by operator".to_owned()
}

/// `DELETE /robots/:robot_id`
pub async fn deregister_robot_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(robot_id): Path<Uuid>,
    Json(payload): Json<DeregisterRobotRequest>,
) -> ApiResult<Json<()>> {
    state.tenant_gateway.authorize(&principal, Permission::RobotCreate)?;

    let robot_id = RobotId::from_uuid(robot_id);
    find_owned_robot(&state, &principal, robot_id).await?;

    state.robots.deregister(robot_id, payload.reason.as_str()).await?;

    state
        .audit_log
        .record(
            Utc::now(),
            AuditAction::RobotMarkedOffline,
            ActorRef::User { id: principal.subject().to_owned() },
            ResourceRef { resource_type: "robot".to_owned(), resource_id: robot_id.to_string() },
            Some(principal.tenant_id()),
            Value::Null,
            None,
            None,
        )
        .await?;

    Ok(Json(()))
}

/// `GET /robots/:robot_id`
pub async fn get_robot_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(robot_id): Path<Uuid>,
) -> ApiResult<Json<RobotResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::RobotRead)?;

    let robot_id = RobotId::from_uuid(robot_id);
    let robot = find_owned_robot(&state, &principal, robot_id).await?;

    Ok(Json(robot.into()))
}

/// `GET /robots`
pub async fn list_robots_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<RobotResponse>>> {
    state.tenant_gateway.authorize(&principal, Permission::RobotRead)?;

    let robots = state.robots.list(principal.tenant_id()).await?;
    Ok(Json(robots.into_iter().map(RobotResponse::from).collect()))
}

async fn find_owned_robot(
    state: &AppState,
    principal: &Principal,
    robot_id: RobotId,
) -> ApiResult<Robot> {
    let robot = state
        .robots
        .find(robot_id)
        .await?
        .filter(|robot| robot.tenant_id() == principal.tenant_id())
        .ok_or_else(|| AppError::NotFound(format!("robot '{robot_id}' not found")))?;

    Ok(robot)
}
