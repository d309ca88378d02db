//! PostgreSQL-backed workflow and version repository, grounded on the
//! teacher's `postgres_workflow_repository.rs` row-mapping conventions and
//! transactional activation pattern.

use async_trait::async_trait;
use casare_application::WorkflowRepository;
use casare_core::{AppError, AppResult, NonEmptyString, TenantId};
use casare_domain::{
    JobVersionPin, UserId, VersionStatus, Workflow, WorkflowId, WorkflowStatus, WorkflowVersion,
    WorkflowVersionId,
};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for workflows and their immutable versions.
#[derive(Clone)]
pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    workspace: String,
    created_by: uuid::Uuid,
    status: String,
}

impl WorkflowRow {
    fn into_workflow(self) -> AppResult<Workflow> {
        Ok(Workflow::from_parts(
            WorkflowId::from_uuid(self.id),
            TenantId::from_uuid(self.tenant_id),
            NonEmptyString::new(self.name)?,
            NonEmptyString::new(self.workspace)?,
            UserId::from_uuid(self.created_by),
            WorkflowStatus::parse(self.status.as_str())?,
        ))
    }
}

#[derive(Debug, FromRow)]
struct WorkflowVersionRow {
    id: uuid::Uuid,
    workflow_id: uuid::Uuid,
    semantic_version: String,
    status: String,
    parent_version: Option<uuid::Uuid>,
    change_summary: Option<String>,
    node_count: i32,
    connection_count: i32,
    content_checksum: Vec<u8>,
    payload: serde_json::Value,
}

impl WorkflowVersionRow {
    fn into_version(self) -> AppResult<WorkflowVersion> {
        let mut checksum = [0u8; 32];
        if self.content_checksum.len() != checksum.len() {
            return Err(AppError::Internal(
                "workflow version checksum is not 32 bytes".to_owned(),
            ));
        }
        checksum.copy_from_slice(&self.content_checksum);

        Ok(WorkflowVersion::from_parts(
            WorkflowVersionId::from_uuid(self.id),
            WorkflowId::from_uuid(self.workflow_id),
            NonEmptyString::new(self.semantic_version)?,
            VersionStatus::parse(self.status.as_str())?,
            self.parent_version.map(WorkflowVersionId::from_uuid),
            self.change_summary,
            u32::try_from(self.node_count)
                .map_err(|error| AppError::Internal(format!("invalid node_count: {error}")))?,
            u32::try_from(self.connection_count)
                .map_err(|error| AppError::Internal(format!("invalid connection_count: {error}")))?,
            checksum,
            self.payload,
        ))
    }
}

#[derive(Debug, FromRow)]
struct JobVersionPinRow {
    workflow_id: uuid::Uuid,
    pinned_version: uuid::Uuid,
    reason: String,
}

impl JobVersionPinRow {
    fn into_pin(self) -> AppResult<JobVersionPin> {
        Ok(JobVersionPin::from_parts(
            WorkflowId::from_uuid(self.workflow_id),
            WorkflowVersionId::from_uuid(self.pinned_version),
            NonEmptyString::new(self.reason)?,
        ))
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn create_workflow(&self, workflow: Workflow) -> AppResult<Workflow> {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, tenant_id, name, workspace, created_by, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(workflow.id().as_uuid())
        .bind(workflow.tenant_id().as_uuid())
        .bind(workflow.name())
        .bind(workflow.workspace())
        .bind(workflow.created_by().as_uuid())
        .bind(workflow.status().as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create workflow: {error}")))?;

        Ok(workflow)
    }

    async fn find_workflow(&self, workflow_id: WorkflowId) -> AppResult<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(r#"SELECT * FROM workflows WHERE id = $1"#)
            .bind(workflow_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load workflow: {error}")))?;

        row.map(WorkflowRow::into_workflow).transpose()
    }

    async fn list_workflows(&self, tenant_id: TenantId) -> AppResult<Vec<Workflow>> {
        let mut transaction = crate::begin_tenant_scoped(&self.pool, tenant_id).await?;

        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"SELECT * FROM workflows WHERE tenant_id = $1 ORDER BY name ASC"#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list workflows: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit tenant-scoped transaction: {error}"))
        })?;

        rows.into_iter().map(WorkflowRow::into_workflow).collect()
    }

    async fn update_workflow(&self, workflow: Workflow) -> AppResult<Workflow> {
        let affected = sqlx::query(r#"UPDATE workflows SET status = $2 WHERE id = $1"#)
            .bind(workflow.id().as_uuid())
            .bind(workflow.status().as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to update workflow: {error}")))?
            .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound(format!(
                "workflow '{}' not found",
                workflow.id()
            )));
        }

        Ok(workflow)
    }

    async fn create_version(&self, version: WorkflowVersion) -> AppResult<WorkflowVersion> {
        sqlx::query(
            r#"
            INSERT INTO workflow_versions (
                id, workflow_id, semantic_version, status, parent_version,
                change_summary, node_count, connection_count, content_checksum, payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(version.id().as_uuid())
        .bind(version.workflow_id().as_uuid())
        .bind(version.semantic_version())
        .bind(version.status().as_str())
        .bind(version.parent_version().map(|id| id.as_uuid()))
        .bind(version.change_summary())
        .bind(i32::try_from(version.node_count()).unwrap_or(i32::MAX))
        .bind(i32::try_from(version.connection_count()).unwrap_or(i32::MAX))
        .bind(version.content_checksum().to_vec())
        .bind(version.payload())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create workflow version: {error}")))?;

        Ok(version)
    }

    async fn find_version(
        &self,
        version_id: WorkflowVersionId,
    ) -> AppResult<Option<WorkflowVersion>> {
        let row = sqlx::query_as::<_, WorkflowVersionRow>(
            r#"SELECT * FROM workflow_versions WHERE id = $1"#,
        )
        .bind(version_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load workflow version: {error}")))?;

        row.map(WorkflowVersionRow::into_version).transpose()
    }

    async fn find_active_version(
        &self,
        workflow_id: WorkflowId,
    ) -> AppResult<Option<WorkflowVersion>> {
        let row = sqlx::query_as::<_, WorkflowVersionRow>(
            r#"
            SELECT * FROM workflow_versions
            WHERE workflow_id = $1 AND status = 'active'
            "#,
        )
        .bind(workflow_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load active workflow version: {error}"))
        })?;

        row.map(WorkflowVersionRow::into_version).transpose()
    }

    async fn list_versions(&self, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowVersion>> {
        let rows = sqlx::query_as::<_, WorkflowVersionRow>(
            r#"
            SELECT * FROM workflow_versions
            WHERE workflow_id = $1
            ORDER BY semantic_version DESC
            "#,
        )
        .bind(workflow_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list workflow versions: {error}")))?;

        rows.into_iter()
            .map(WorkflowVersionRow::into_version)
            .collect()
    }

    async fn activate_version(
        &self,
        workflow_id: WorkflowId,
        target_version: WorkflowVersionId,
    ) -> AppResult<WorkflowVersion> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        sqlx::query(
            r#"
            UPDATE workflow_versions
            SET status = 'deprecated'
            WHERE workflow_id = $1 AND status = 'active'
            "#,
        )
        .bind(workflow_id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to deprecate prior active version: {error}"))
        })?;

        let row = sqlx::query_as::<_, WorkflowVersionRow>(
            r#"
            UPDATE workflow_versions
            SET status = 'active'
            WHERE id = $1 AND workflow_id = $2 AND status != 'archived'
            RETURNING *
            "#,
        )
        .bind(target_version.as_uuid())
        .bind(workflow_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to activate workflow version: {error}")))?;

        let Some(row) = row else {
            transaction.rollback().await.map_err(|error| {
                AppError::Internal(format!("failed to roll back transaction: {error}"))
            })?;
            return Err(AppError::Conflict(format!(
                "workflow version '{target_version}' cannot be activated"
            )));
        };

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        row.into_version()
    }

    async fn upsert_pin(&self, pin: JobVersionPin) -> AppResult<JobVersionPin> {
        sqlx::query(
            r#"
            INSERT INTO job_version_pins (workflow_id, pinned_version, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (workflow_id) DO UPDATE SET
                pinned_version = EXCLUDED.pinned_version,
                reason = EXCLUDED.reason
            "#,
        )
        .bind(pin.workflow_id().as_uuid())
        .bind(pin.pinned_version().as_uuid())
        .bind(pin.reason())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to upsert version pin: {error}")))?;

        Ok(pin)
    }

    async fn find_pin(&self, workflow_id: WorkflowId) -> AppResult<Option<JobVersionPin>> {
        let row = sqlx::query_as::<_, JobVersionPinRow>(
            r#"SELECT * FROM job_version_pins WHERE workflow_id = $1"#,
        )
        .bind(workflow_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load version pin: {error}")))?;

        row.map(JobVersionPinRow::into_pin).transpose()
    }

    async fn remove_pin(&self, workflow_id: WorkflowId) -> AppResult<()> {
        sqlx::query(r#"DELETE FROM job_version_pins WHERE workflow_id = $1"#)
            .bind(workflow_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to remove version pin: {error}")))?;

        Ok(())
    }
}
