use axum::extract::{Path, State};
use axum::{Extension, Json};
use casare_core::{AppError, Principal};
use casare_domain::{
    ActorRef, AuditAction, JobVersionPin, Permission, ResourceRef, UserId, Workflow, WorkflowId,
    WorkflowVersion, WorkflowVersionId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub workspace: String,
    pub created_by: Uuid,
    pub status: &'static str,
}

impl From<Workflow> for WorkflowResponse {
    fn from(workflow: Workflow) -> Self {
        Self {
            id: workflow.id().as_uuid(),
            tenant_id: workflow.tenant_id().as_uuid(),
            name: workflow.name().to_owned(),
            workspace: workflow.workspace().to_owned(),
            created_by: workflow.created_by().as_uuid(),
            status: workflow.status().as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkflowVersionResponse {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub semantic_version: String,
    pub status: &'static str,
    pub parent_version: Option<Uuid>,
    pub change_summary: Option<String>,
    pub node_count: u32,
    pub connection_count: u32,
    pub content_checksum: String,
    pub payload: Value,
}

impl From<WorkflowVersion> for WorkflowVersionResponse {
    fn from(version: WorkflowVersion) -> Self {
        Self {
            id: version.id().as_uuid(),
            workflow_id: version.workflow_id().as_uuid(),
            semantic_version: version.semantic_version().to_owned(),
            status: version.status().as_str(),
            parent_version: version.parent_version().map(|id| id.as_uuid()),
            change_summary: version.change_summary().map(str::to_owned),
            node_count: version.node_count(),
            connection_count: version.connection_count(),
            content_checksum: hex::encode(version.content_checksum()),
            payload: version.payload().clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub workspace: String,
}

/// `POST /workflows`
pub async fn create_workflow_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> ApiResult<Json<WorkflowResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::WorkflowWrite)?;

    let created_by = parse_user_id(principal.subject())?;
    let workflow = Workflow::new(principal.tenant_id(), payload.name, payload.workspace, created_by)?;
    let workflow = state.workflow_versions.create_workflow(workflow).await?;

    state
        .audit_log
        .record(
            Utc::now(),
            AuditAction::WorkflowCreated,
            ActorRef::User { id: principal.subject().to_owned() },
            ResourceRef {
                resource_type: "workflow".to_owned(),
                resource_id: workflow.id().to_string(),
            },
            Some(principal.tenant_id()),
            Value::Null,
            None,
            None,
        )
        .await?;

    Ok(Json(workflow.into()))
}

/// `GET /workflows/:workflow_id`
pub async fn get_workflow_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(workflow_id): Path<Uuid>,
) -> ApiResult<Json<WorkflowResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::WorkflowRead)?;

    let workflow_id = WorkflowId::from_uuid(workflow_id);
    let workflow = find_owned_workflow(&state, &principal, workflow_id).await?;

    Ok(Json(workflow.into()))
}

#[derive(Debug, Deserialize)]
pub struct CreateVersionRequest {
    pub semantic_version: String,
    pub parent_version: Option<Uuid>,
    pub change_summary: Option<String>,
    pub node_count: u32,
    pub connection_count: u32,
    pub payload: Value,
}

/// `POST /workflows/:workflow_id/versions`
pub async fn create_version_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(workflow_id): Path<Uuid>,
    Json(payload): Json<CreateVersionRequest>,
) -> ApiResult<Json<WorkflowVersionResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::WorkflowWrite)?;

    let workflow_id = WorkflowId::from_uuid(workflow_id);
    find_owned_workflow(&state, &principal, workflow_id).await?;

    let canonical = serde_json::to_vec(&payload.payload)
        .map_err(|error| AppError::Validation(format!("payload is not serializable: {error}")))?;
    let content_checksum: [u8; 32] = Sha256::digest(&canonical).into();

    let version = WorkflowVersion::new_draft(
        workflow_id,
        payload.semantic_version,
        payload.parent_version.map(WorkflowVersionId::from_uuid),
        payload.change_summary,
        payload.node_count,
        payload.connection_count,
        content_checksum,
        payload.payload,
    )?;

    let version = state.workflow_versions.create_version(version).await?;

    Ok(Json(version.into()))
}

/// `POST /workflows/:workflow_id/versions/:version_id/activate`
pub async fn activate_version_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((workflow_id, version_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<WorkflowVersionResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::WorkflowWrite)?;

    let workflow_id = WorkflowId::from_uuid(workflow_id);
    find_owned_workflow(&state, &principal, workflow_id).await?;

    let version_id = WorkflowVersionId::from_uuid(version_id);
    let activated = state
        .workflow_versions
        .activate_version(workflow_id, version_id)
        .await?;

    state
        .audit_log
        .record(
            Utc::now(),
            AuditAction::WorkflowVersionActivated,
            ActorRef::User { id: principal.subject().to_owned() },
            ResourceRef {
                resource_type: "workflow_version".to_owned(),
                resource_id: version_id.to_string(),
            },
            Some(principal.tenant_id()),
            Value::Null,
            None,
            None,
        )
        .await?;

    Ok(Json(activated.into()))
}

/// `GET /workflows/:workflow_id/versions`
pub async fn list_versions_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(workflow_id): Path<Uuid>,
) -> ApiResult<Json<Vec<WorkflowVersionResponse>>> {
    state.tenant_gateway.authorize(&principal, Permission::WorkflowRead)?;

    let workflow_id = WorkflowId::from_uuid(workflow_id);
    find_owned_workflow(&state, &principal, workflow_id).await?;

    let versions = state.workflow_versions.list_versions(workflow_id).await?;
    Ok(Json(versions.into_iter().map(WorkflowVersionResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct PinVersionRequest {
    pub pinned_version: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct PinResponse {
    pub workflow_id: Uuid,
    pub pinned_version: Uuid,
    pub reason: String,
}

impl From<JobVersionPin> for PinResponse {
    fn from(pin: JobVersionPin) -> Self {
        Self {
            workflow_id: pin.workflow_id().as_uuid(),
            pinned_version: pin.pinned_version().as_uuid(),
            reason: pin.reason().to_owned(),
        }
    }
}

/// `PUT /workflows/:workflow_id/pin`
pub async fn pin_version_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(workflow_id): Path<Uuid>,
    Json(payload): Json<PinVersionRequest>,
) -> ApiResult<Json<PinResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::WorkflowWrite)?;

    let workflow_id = WorkflowId::from_uuid(workflow_id);
    find_owned_workflow(&state, &principal, workflow_id).await?;

    let pin = JobVersionPin::new(
        workflow_id,
        WorkflowVersionId::from_uuid(payload.pinned_version),
        payload.reason,
    )?;
    let pin = state.workflow_versions.pin_job(pin).await?;

    Ok(Json(pin.into()))
}

/// `DELETE /workflows/:workflow_id/pin`
pub async fn remove_pin_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(workflow_id): Path<Uuid>,
) -> ApiResult<Json<()>> {
    state.tenant_gateway.authorize(&principal, Permission::WorkflowWrite)?;

    let workflow_id = WorkflowId::from_uuid(workflow_id);
    find_owned_workflow(&state, &principal, workflow_id).await?;

    state.workflow_versions.remove_pin(workflow_id).await?;
    Ok(Json(()))
}

async fn find_owned_workflow(
    state: &AppState,
    principal: &Principal,
    workflow_id: WorkflowId,
) -> ApiResult<Workflow> {
    let workflow = state
        .workflow_versions
        .find_workflow(workflow_id)
        .await?
        .filter(|workflow| workflow.tenant_id() == principal.tenant_id())
        .ok_or_else(|| AppError::NotFound(format!("workflow '{workflow_id}' not found")))?;

    Ok(workflow)
}

fn parse_user_id(subject: &str) -> Result<UserId, AppError> {
    let uuid = Uuid::parse_str(subject)
        .map_err(|error| AppError::Internal(format!("subject is not a valid user id: {error}")))?;
    Ok(UserId::from_uuid(uuid))
}
