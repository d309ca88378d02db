use casare_core::{define_uuid_id, AppError, AppResult, NonEmptyString, TenantId};
use serde::{Deserialize, Serialize};

use crate::security::UserId;

define_uuid_id!(
    /// Identifier for a workflow container.
    WorkflowId
);
define_uuid_id!(
    /// Identifier for an immutable workflow version payload.
    WorkflowVersionId
);

/// Lifecycle state of a workflow container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Still being authored; has no active version requirement.
    Draft,
    /// Has at least one published version and may be targeted by jobs.
    Published,
    /// Retired from new execution but retained for history.
    Archived,
    /// Temporarily blocked from new execution by an operator.
    Disabled,
}

impl WorkflowStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
            Self::Disabled => "disabled",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            "disabled" => Ok(Self::Disabled),
            other => Err(AppError::Validation(format!(
                "unknown workflow status value '{other}'"
            ))),
        }
    }
}

/// Lifecycle state of a single workflow version payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Newly created, not yet eligible for execution.
    Draft,
    /// The single version new jobs execute unless pinned.
    Active,
    /// Superseded by a newer active version; may still be pinned.
    Deprecated,
    /// Retired; may never be targeted, pinned or not.
    Archived,
}

impl VersionStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::Validation(format!(
                "unknown workflow version status value '{other}'"
            ))),
        }
    }
}

/// Tenant-scoped named container of `WorkflowVersion`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    id: WorkflowId,
    tenant_id: TenantId,
    name: NonEmptyString,
    workspace: NonEmptyString,
    created_by: UserId,
    status: WorkflowStatus,
}

impl Workflow {
    /// Creates a new workflow container in `Draft` status.
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        workspace: impl Into<String>,
        created_by: UserId,
    ) -> AppResult<Self> {
        Ok(Self {
            id: WorkflowId::new(),
            tenant_id,
            name: NonEmptyString::new(name)?,
            workspace: NonEmptyString::new(workspace)?,
            created_by,
            status: WorkflowStatus::Draft,
        })
    }

    /// Reconstructs a workflow from persisted fields without re-running
    /// creation-time validation (used by repository `FromRow` mappings).
    #[must_use]
    pub fn from_parts(
        id: WorkflowId,
        tenant_id: TenantId,
        name: NonEmptyString,
        workspace: NonEmptyString,
        created_by: UserId,
        status: WorkflowStatus,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            workspace,
            created_by,
            status,
        }
    }

    /// Returns the workflow identifier.
    #[must_use]
    pub fn id(&self) -> WorkflowId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the workflow's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the workspace the workflow belongs to.
    #[must_use]
    pub fn workspace(&self) -> &str {
        self.workspace.as_str()
    }

    /// Returns the user who created the workflow.
    #[must_use]
    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Marks the workflow as published once it has at least one active
    /// version.
    pub fn mark_published(&mut self) {
        self.status = WorkflowStatus::Published;
    }

    /// Archives the workflow, retiring it from new execution.
    pub fn archive(&mut self) {
        self.status = WorkflowStatus::Archived;
    }

    /// Returns `true` if new jobs may target this workflow.
    #[must_use]
    pub fn accepts_new_jobs(&self) -> bool {
        matches!(self.status, WorkflowStatus::Published)
    }
}

/// An immutable serialized workflow payload plus version metadata.
///
/// Invariant: at most one version per workflow is ever `Active`; activating
/// a new version atomically deprecates the one it replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    id: WorkflowVersionId,
    workflow_id: WorkflowId,
    semantic_version: NonEmptyString,
    status: VersionStatus,
    parent_version: Option<WorkflowVersionId>,
    change_summary: Option<String>,
    node_count: u32,
    connection_count: u32,
    content_checksum: [u8; 32],
    payload: serde_json::Value,
}

impl WorkflowVersion {
    /// Creates a new draft version. `content_checksum` is computed by the
    /// caller (typically `sha2::Sha256` over the canonical payload bytes)
    /// so that this pure domain type has no hashing dependency.
    pub fn new_draft(
        workflow_id: WorkflowId,
        semantic_version: impl Into<String>,
        parent_version: Option<WorkflowVersionId>,
        change_summary: Option<String>,
        node_count: u32,
        connection_count: u32,
        content_checksum: [u8; 32],
        payload: serde_json::Value,
    ) -> AppResult<Self> {
        if !payload.is_object() {
            return Err(AppError::Validation(
                "workflow version payload must be a JSON object".to_owned(),
            ));
        }

        Ok(Self {
            id: WorkflowVersionId::new(),
            workflow_id,
            semantic_version: NonEmptyString::new(semantic_version)?,
            status: VersionStatus::Draft,
            parent_version,
            change_summary,
            node_count,
            connection_count,
            content_checksum,
            payload,
        })
    }

    /// Reconstructs a workflow version from persisted fields without
    /// re-running creation-time validation (used by repository `FromRow`
    /// mappings).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: WorkflowVersionId,
        workflow_id: WorkflowId,
        semantic_version: NonEmptyString,
        status: VersionStatus,
        parent_version: Option<WorkflowVersionId>,
        change_summary: Option<String>,
        node_count: u32,
        connection_count: u32,
        content_checksum: [u8; 32],
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            workflow_id,
            semantic_version,
            status,
            parent_version,
            change_summary,
            node_count,
            connection_count,
            content_checksum,
            payload,
        }
    }

    /// Returns the version identifier.
    #[must_use]
    pub fn id(&self) -> WorkflowVersionId {
        self.id
    }

    /// Returns the owning workflow.
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Returns the semantic version string.
    #[must_use]
    pub fn semantic_version(&self) -> &str {
        self.semantic_version.as_str()
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> VersionStatus {
        self.status
    }

    /// Returns the parent version this one was derived from, if any.
    #[must_use]
    pub fn parent_version(&self) -> Option<WorkflowVersionId> {
        self.parent_version
    }

    /// Returns the operator-supplied change summary, if any.
    #[must_use]
    pub fn change_summary(&self) -> Option<&str> {
        self.change_summary.as_deref()
    }

    /// Returns the node count recorded for this version's payload.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Returns the connection count recorded for this version's payload.
    #[must_use]
    pub fn connection_count(&self) -> u32 {
        self.connection_count
    }

    /// Returns the content checksum over the canonical payload bytes.
    #[must_use]
    pub fn content_checksum(&self) -> [u8; 32] {
        self.content_checksum
    }

    /// Returns the serialized workflow payload.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Transitions this version to `Active`. The caller is responsible for
    /// the transactional "deprecate the prior active version first" step
    /// (see `application::workflow_version_service::activate_version`).
    pub fn activate(&mut self) -> AppResult<()> {
        if self.status == VersionStatus::Archived {
            return Err(AppError::Conflict(
                "archived versions may never be reactivated".to_owned(),
            ));
        }

        self.status = VersionStatus::Active;
        Ok(())
    }

    /// Transitions this version to `Deprecated`.
    pub fn deprecate(&mut self) -> AppResult<()> {
        if self.status != VersionStatus::Active {
            return Err(AppError::Conflict(
                "only the active version may be deprecated".to_owned(),
            ));
        }

        self.status = VersionStatus::Deprecated;
        Ok(())
    }

    /// Returns `true` if a job may be pinned to execute this exact version.
    ///
    /// Resolves open question (b): pinned execution may target `Active` or
    /// `Deprecated` versions but never `Archived` ones.
    #[must_use]
    pub fn pinnable(&self) -> bool {
        !matches!(self.status, VersionStatus::Archived)
    }
}

/// Optional mapping pinning a schedule or job to a specific
/// `WorkflowVersion`. When absent, execution resolves to the workflow's
/// current active version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobVersionPin {
    workflow_id: WorkflowId,
    pinned_version: WorkflowVersionId,
    reason: NonEmptyString,
}

impl JobVersionPin {
    /// Creates a new pin, recording a reason for audit purposes.
    pub fn new(
        workflow_id: WorkflowId,
        pinned_version: WorkflowVersionId,
        reason: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            workflow_id,
            pinned_version,
            reason: NonEmptyString::new(reason)?,
        })
    }

    /// Reconstructs a pin from persisted fields without re-running
    /// creation-time validation (used by repository `FromRow` mappings).
    #[must_use]
    pub fn from_parts(
        workflow_id: WorkflowId,
        pinned_version: WorkflowVersionId,
        reason: NonEmptyString,
    ) -> Self {
        Self {
            workflow_id,
            pinned_version,
            reason,
        }
    }

    /// Returns the workflow this pin applies to.
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Returns the pinned version.
    #[must_use]
    pub fn pinned_version(&self) -> WorkflowVersionId {
        self.pinned_version
    }

    /// Returns the operator-supplied reason for the pin.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::{VersionStatus, Workflow, WorkflowId, WorkflowVersion};
    use casare_core::TenantId;
    use crate::security::UserId;
    use serde_json::json;

    #[test]
    fn new_workflow_starts_draft_and_rejects_jobs() {
        let workflow = Workflow::new(TenantId::new(), "invoice-bot", "default", UserId::new())
            .expect("valid workflow");
        assert!(!workflow.accepts_new_jobs());
    }

    #[test]
    fn version_rejects_non_object_payload() {
        let result = WorkflowVersion::new_draft(
            WorkflowId::new(),
            "1.0.0",
            None,
            None,
            1,
            0,
            [0u8; 32],
            json!([1, 2, 3]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn archived_version_cannot_be_reactivated() {
        let mut version = WorkflowVersion::new_draft(
            WorkflowId::new(),
            "1.0.0",
            None,
            None,
            1,
            0,
            [0u8; 32],
            json!({}),
        )
        .expect("valid version");
        version.activate().expect("can activate");
        version.deprecate().expect("can deprecate");
        // Simulate an archive transition performed by the repository layer.
        let mut archived = version.clone();
        archived.status = VersionStatus::Archived;
        assert!(archived.activate().is_err());
    }
}
