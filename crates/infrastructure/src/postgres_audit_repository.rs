//! PostgreSQL-backed append-only audit log, grounded on the teacher's
//! `postgres_tenant_repository.rs` connection-pool wiring, generalized to a
//! single-table hash chain with periodic Merkle-root checkpoints.

use async_trait::async_trait;
use casare_application::{AuditMerkleRoot, AuditRepository};
use casare_core::{AppError, AppResult, TenantId};
use casare_domain::{ActorRef, AuditAction, AuditLogEntry, AuditLogEntryId, ResourceRef};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for the append-only, hash-chained audit
/// log.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditLogEntryRow {
    sequence_id: i64,
    entry_id: uuid::Uuid,
    timestamp: DateTime<Utc>,
    action: String,
    actor: serde_json::Value,
    resource_type: String,
    resource_id: String,
    tenant_id: Option<uuid::Uuid>,
    details: serde_json::Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    previous_hash: Vec<u8>,
    entry_hash: Vec<u8>,
}

fn hash_from_bytes(bytes: Vec<u8>, column: &str) -> AppResult<[u8; 32]> {
    <[u8; 32]>::try_from(bytes)
        .map_err(|_| AppError::Internal(format!("stored {column} is not 32 bytes")))
}

impl AuditLogEntryRow {
    fn into_entry(self) -> AppResult<AuditLogEntry> {
        let actor: ActorRef = serde_json::from_value(self.actor)
            .map_err(|error| AppError::Internal(format!("invalid stored audit actor: {error}")))?;

        Ok(AuditLogEntry::new(
            u64::try_from(self.sequence_id)
                .map_err(|error| AppError::Internal(format!("invalid sequence_id: {error}")))?,
            AuditLogEntryId::from_uuid(self.entry_id),
            self.timestamp,
            AuditAction::parse(self.action.as_str())?,
            actor,
            ResourceRef { resource_type: self.resource_type, resource_id: self.resource_id },
            self.tenant_id.map(TenantId::from_uuid),
            self.details,
            self.ip_address,
            self.user_agent,
            hash_from_bytes(self.previous_hash, "previous_hash")?,
            hash_from_bytes(self.entry_hash, "entry_hash")?,
        ))
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append(&self, entry: AuditLogEntry) -> AppResult<AuditLogEntry> {
        let actor = serde_json::to_value(entry.actor())
            .map_err(|error| AppError::Internal(format!("failed to serialize audit actor: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO audit_log (
                sequence_id, entry_id, timestamp, action, actor, resource_type, resource_id,
                tenant_id, details, ip_address, user_agent, previous_hash, entry_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(i64::try_from(entry.sequence_id())
            .map_err(|error| AppError::Internal(format!("sequence_id overflow: {error}")))?)
        .bind(entry.entry_id().as_uuid())
        .bind(entry.timestamp())
        .bind(entry.action().as_str())
        .bind(&actor)
        .bind(&entry.resource().resource_type)
        .bind(&entry.resource().resource_id)
        .bind(entry.tenant_id().map(|id| id.as_uuid()))
        .bind(entry.details())
        .bind(entry.ip_address())
        .bind(entry.user_agent())
        .bind(entry.previous_hash().to_vec())
        .bind(entry.entry_hash().to_vec())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append audit entry: {error}")))?;

        Ok(entry)
    }

    async fn last_entry(&self) -> AppResult<Option<AuditLogEntry>> {
        let row = sqlx::query_as::<_, AuditLogEntryRow>(
            r#"SELECT * FROM audit_log ORDER BY sequence_id DESC LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load last audit entry: {error}")))?;

        row.map(AuditLogEntryRow::into_entry).transpose()
    }

    async fn read_range(
        &self,
        tenant_id: Option<TenantId>,
        start_id: u64,
        end_id: u64,
    ) -> AppResult<Vec<AuditLogEntry>> {
        let start_id = i64::try_from(start_id)
            .map_err(|error| AppError::Internal(format!("start_id overflow: {error}")))?;
        let end_id = i64::try_from(end_id)
            .map_err(|error| AppError::Internal(format!("end_id overflow: {error}")))?;

        let rows = match tenant_id {
            Some(tenant_id) => {
                let mut transaction = crate::begin_tenant_scoped(&self.pool, tenant_id).await?;

                let rows = sqlx::query_as::<_, AuditLogEntryRow>(
                    r#"
                    SELECT * FROM audit_log
                    WHERE sequence_id BETWEEN $1 AND $2 AND tenant_id = $3
                    ORDER BY sequence_id ASC
                    "#,
                )
                .bind(start_id)
                .bind(end_id)
                .bind(tenant_id.as_uuid())
                .fetch_all(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to read audit range: {error}"))
                })?;

                transaction.commit().await.map_err(|error| {
                    AppError::Internal(format!(
                        "failed to commit tenant-scoped transaction: {error}"
                    ))
                })?;

                rows
            }
            None => sqlx::query_as::<_, AuditLogEntryRow>(
                r#"
                SELECT * FROM audit_log
                WHERE sequence_id BETWEEN $1 AND $2 AND tenant_id IS NULL
                ORDER BY sequence_id ASC
                "#,
            )
            .bind(start_id)
            .bind(end_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to read audit range: {error}")))?,
        };

        rows.into_iter().map(AuditLogEntryRow::into_entry).collect()
    }

    async fn record_merkle_root(&self, root: AuditMerkleRoot) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_merkle_roots (start_id, end_id, entry_count, root, computed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(i64::try_from(root.start_id)
            .map_err(|error| AppError::Internal(format!("start_id overflow: {error}")))?)
        .bind(i64::try_from(root.end_id)
            .map_err(|error| AppError::Internal(format!("end_id overflow: {error}")))?)
        .bind(i64::try_from(root.entry_count)
            .map_err(|error| AppError::Internal(format!("entry_count overflow: {error}")))?)
        .bind(root.root.to_vec())
        .bind(root.computed_at)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to record merkle root: {error}")))?;

        Ok(())
    }

    async fn last_rooted_sequence_id(&self) -> AppResult<Option<u64>> {
        let end_id = sqlx::query_scalar::<_, Option<i64>>(
            r#"SELECT MAX(end_id) FROM audit_merkle_roots"#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load last rooted sequence id: {error}")))?;

        end_id
            .map(u64::try_from)
            .transpose()
            .map_err(|error| AppError::Internal(format!("invalid stored end_id: {error}")))
    }

    async fn latest_sequence_id(&self) -> AppResult<Option<u64>> {
        let sequence_id = sqlx::query_scalar::<_, Option<i64>>(
            r#"SELECT MAX(sequence_id) FROM audit_log"#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load latest sequence id: {error}")))?;

        sequence_id
            .map(u64::try_from)
            .transpose()
            .map_err(|error| AppError::Internal(format!("invalid stored sequence_id: {error}")))
    }
}
