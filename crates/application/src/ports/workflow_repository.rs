use async_trait::async_trait;
use casare_core::{AppResult, TenantId};
use casare_domain::{JobVersionPin, Workflow, WorkflowId, WorkflowVersion, WorkflowVersionId};

/// Repository port for workflows and their immutable versions.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Persists a newly created workflow.
    async fn create_workflow(&self, workflow: Workflow) -> AppResult<Workflow>;

    /// Returns a workflow by id.
    async fn find_workflow(&self, workflow_id: WorkflowId) -> AppResult<Option<Workflow>>;

    /// Lists workflows for a tenant.
    async fn list_workflows(&self, tenant_id: TenantId) -> AppResult<Vec<Workflow>>;

    /// Persists an updated workflow (status transitions).
    async fn update_workflow(&self, workflow: Workflow) -> AppResult<Workflow>;

    /// Creates a new draft version.
    async fn create_version(&self, version: WorkflowVersion) -> AppResult<WorkflowVersion>;

    /// Returns a version by id.
    async fn find_version(
        &self,
        version_id: WorkflowVersionId,
    ) -> AppResult<Option<WorkflowVersion>>;

    /// Returns the currently active version for a workflow, if any.
    async fn find_active_version(
        &self,
        workflow_id: WorkflowId,
    ) -> AppResult<Option<WorkflowVersion>>;

    /// Lists every version of a workflow, newest first.
    async fn list_versions(&self, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowVersion>>;

    /// Atomically activates `target_version`: deprecates the currently
    /// active version (if any) and marks `target_version` active. Rolls
    /// back entirely if the activation affects zero rows.
    async fn activate_version(
        &self,
        workflow_id: WorkflowId,
        target_version: WorkflowVersionId,
    ) -> AppResult<WorkflowVersion>;

    /// Creates or replaces a job/schedule version pin.
    async fn upsert_pin(&self, pin: JobVersionPin) -> AppResult<JobVersionPin>;

    /// Returns the pin for a workflow, if one exists.
    async fn find_pin(&self, workflow_id: WorkflowId) -> AppResult<Option<JobVersionPin>>;

    /// Removes a pin, reverting execution to the active version.
    async fn remove_pin(&self, workflow_id: WorkflowId) -> AppResult<()>;
}
