//! Workflow & version store, grounded on the teacher's
//! `postgres_app_repository`/`app_service` transactional publish-activate
//! pattern, adapted here to `WorkflowVersion`'s single-active-version
//! invariant.

use std::sync::Arc;

use casare_core::{AppError, AppResult};
use casare_domain::{
    JobVersionPin, QuotaResource, Workflow, WorkflowId, WorkflowVersion, WorkflowVersionId,
};

use crate::ports::WorkflowRepository;
use crate::tenant_gateway_service::TenantGatewayService;

/// Application service for workflow containers and their immutable
/// versions.
#[derive(Clone)]
pub struct WorkflowVersionService {
    repository: Arc<dyn WorkflowRepository>,
    tenant_gateway: TenantGatewayService,
}

impl WorkflowVersionService {
    /// Creates a new workflow version service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        tenant_gateway: TenantGatewayService,
    ) -> Self {
        Self {
            repository,
            tenant_gateway,
        }
    }

    /// Creates a new workflow container, asserting the tenant has not
    /// exhausted its workflow quota.
    pub async fn create_workflow(&self, workflow: Workflow) -> AppResult<Workflow> {
        self.tenant_gateway
            .check_quota(workflow.tenant_id(), QuotaResource::Workflow)
            .await?;

        self.repository.create_workflow(workflow).await
    }

    /// Returns a workflow by id.
    pub async fn find_workflow(&self, workflow_id: WorkflowId) -> AppResult<Option<Workflow>> {
        self.repository.find_workflow(workflow_id).await
    }

    /// Creates a new draft version of a workflow.
    pub async fn create_version(&self, version: WorkflowVersion) -> AppResult<WorkflowVersion> {
        self.repository.create_version(version).await
    }

    /// Atomically activates `target_version`, deprecating the workflow's
    /// current active version first, then marks the owning workflow
    /// `Published` if this is its first active version.
    pub async fn activate_version(
        &self,
        workflow_id: WorkflowId,
        target_version: WorkflowVersionId,
    ) -> AppResult<WorkflowVersion> {
        let target = self
            .repository
            .find_version(target_version)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("version '{target_version}' not found")))?;

        if target.workflow_id() != workflow_id {
            return Err(AppError::Validation(
                "version does not belong to the given workflow".to_owned(),
            ));
        }

        let activated = self
            .repository
            .activate_version(workflow_id, target_version)
            .await?;

        let mut workflow = self
            .repository
            .find_workflow(workflow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("workflow '{workflow_id}' not found")))?;

        if !workflow.accepts_new_jobs() {
            workflow.mark_published();
            self.repository.update_workflow(workflow).await?;
        }

        Ok(activated)
    }

    /// Resolves the version a new job targeting `workflow_id` should
    /// execute: the explicit pin if one exists, otherwise the current
    /// active version.
    pub async fn resolve_for_execution(
        &self,
        workflow_id: WorkflowId,
    ) -> AppResult<WorkflowVersion> {
        if let Some(pin) = self.repository.find_pin(workflow_id).await? {
            let pinned = self
                .repository
                .find_version(pin.pinned_version())
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "pin references missing version '{}'",
                        pin.pinned_version()
                    ))
                })?;

            if !pinned.pinnable() {
                return Err(AppError::Conflict(format!(
                    "pinned version '{}' is archived and may no longer execute",
                    pinned.id()
                )));
            }

            return Ok(pinned);
        }

        self.repository
            .find_active_version(workflow_id)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "workflow '{workflow_id}' has no active version to execute"
                ))
            })
    }

    /// Pins a workflow to a specific version, recording an audit reason.
    pub async fn pin_job(&self, pin: JobVersionPin) -> AppResult<JobVersionPin> {
        let version = self
            .repository
            .find_version(pin.pinned_version())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("version '{}' not found", pin.pinned_version()))
            })?;

        if !version.pinnable() {
            return Err(AppError::Validation(
                "cannot pin to an archived version".to_owned(),
            ));
        }

        self.repository.upsert_pin(pin).await
    }

    /// Removes a pin, reverting execution to the workflow's active version.
    pub async fn remove_pin(&self, workflow_id: WorkflowId) -> AppResult<()> {
        self.repository.remove_pin(workflow_id).await
    }

    /// Lists every version of a workflow, newest first.
    pub async fn list_versions(&self, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowVersion>> {
        self.repository.list_versions(workflow_id).await
    }

    /// Returns a specific version by id, used by the dispatcher's
    /// assignment tick to resolve the payload a claimed job's `JobAssign`
    /// frame carries.
    pub async fn find_version(
        &self,
        version_id: WorkflowVersionId,
    ) -> AppResult<Option<WorkflowVersion>> {
        self.repository.find_version(version_id).await
    }
}
