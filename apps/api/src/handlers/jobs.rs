use std::collections::BTreeSet;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use casare_core::{AppError, Principal};
use casare_domain::{
    ActorRef, AuditAction, Capability, JobId, JobPriority, Permission, ResourceRef, TriggerType,
    WorkflowVersionId,
};
use casare_application::{EnqueueJobInput, RobotFrame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub workflow_version: Uuid,
    pub priority: u8,
    #[serde(default)]
    pub variables: Value,
    pub trigger_type: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_version: Uuid,
    pub priority: u8,
    pub variables: Value,
    pub trigger_type: &'static str,
    pub status: &'static str,
    pub assigned_robot: Option<Uuid>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub scheduled_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl From<casare_domain::Job> for JobResponse {
    fn from(job: casare_domain::Job) -> Self {
        Self {
            id: job.id().as_uuid(),
            tenant_id: job.tenant_id().as_uuid(),
            workflow_version: job.workflow_version().as_uuid(),
            priority: job.priority().as_u8(),
            variables: job.variables().clone(),
            trigger_type: job.trigger_type().as_str(),
            status: job.status().as_str(),
            assigned_robot: job.assigned_robot().map(|id| id.as_uuid()),
            retry_count: job.retry_count(),
            max_retries: job.max_retries(),
            scheduled_time: job.scheduled_time(),
            created_at: job.created_at(),
            completed_at: job.completed_at(),
            result: job.result().cloned(),
            error: job.error().map(str::to_owned),
        }
    }
}

/// `POST /jobs` — enqueues a job against a resolved workflow version.
pub async fn submit_job_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<SubmitJobRequest>,
) -> ApiResult<Json<JobResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::JobWrite)?;

    let required_capabilities: BTreeSet<Capability> = payload
        .required_capabilities
        .iter()
        .map(|value| Capability::parse(value))
        .collect();

    let input = EnqueueJobInput {
        tenant_id: principal.tenant_id(),
        workflow_version: WorkflowVersionId::from_uuid(payload.workflow_version),
        priority: JobPriority::from_u8(payload.priority)?,
        variables: payload.variables,
        trigger_type: TriggerType::parse(payload.trigger_type.as_str())?,
        max_retries: payload.max_retries,
        scheduled_time: payload.scheduled_time.unwrap_or_else(Utc::now),
        required_capabilities,
    };

    let job = state.job_queue.enqueue(input).await?;

    state
        .audit_log
        .record(
            Utc::now(),
            AuditAction::JobEnqueued,
            ActorRef::User { id: principal.subject().to_owned() },
            ResourceRef { resource_type: "job".to_owned(), resource_id: job.id().to_string() },
            Some(principal.tenant_id()),
            Value::Null,
            None,
            None,
        )
        .await?;

    Ok(Json(job.into()))
}

#[derive(Debug, Deserialize)]
pub struct CancelJobRequest {
    #[serde(default = "default_cancel_reason")]
    pub reason: String,
}

fn default_cancel_reason() -> String {
    "cancelled by operator".to_owned()
}

/// `POST /jobs/:job_id/cancel`
pub async fn cancel_job_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<CancelJobRequest>,
) -> ApiResult<Json<JobResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::JobWrite)?;

    let job_id = JobId::from_uuid(job_id);
    let job = state.job_queue.find(job_id).await?.ok_or_else(|| {
        AppError::NotFound(format!("job '{job_id}' not found"))
    })?;

    if job.tenant_id() != principal.tenant_id() {
        return Err(AppError::NotFound(format!("job '{job_id}' not found")).into());
    }

    let cancelled = state.job_queue.cancel(job_id, payload.reason.as_str()).await?;

    if let Some(robot_id) = cancelled.assigned_robot() {
        let frame = RobotFrame::JobCancel {
            correlation_id: Uuid::new_v4(),
            job_id,
            reason: payload.reason.clone(),
        };
        if let Err(error) = state.robot_frame_bus.publish(robot_id, &frame).await {
            tracing::warn!(%error, %job_id, "failed to publish job cancellation to robot");
        }
    }

    state
        .audit_log
        .record(
            Utc::now(),
            AuditAction::JobCancelled,
            ActorRef::User { id: principal.subject().to_owned() },
            ResourceRef { resource_type: "job".to_owned(), resource_id: job_id.to_string() },
            Some(principal.tenant_id()),
            Value::Null,
            None,
            None,
        )
        .await?;

    Ok(Json(cancelled.into()))
}

/// `GET /jobs/:job_id`
pub async fn get_job_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::JobRead)?;

    let job_id = JobId::from_uuid(job_id);
    let job = state
        .job_queue
        .find(job_id)
        .await?
        .filter(|job| job.tenant_id() == principal.tenant_id())
        .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' not found")))?;

    Ok(Json(job.into()))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
}

/// `GET /jobs`
pub async fn list_jobs_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<ListJobsResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::JobRead)?;

    let jobs = state
        .job_queue
        .list(principal.tenant_id(), query.limit, query.offset)
        .await?;

    Ok(Json(ListJobsResponse { jobs: jobs.into_iter().map(JobResponse::from).collect() }))
}
