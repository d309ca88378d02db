//! PostgreSQL-backed API key repository, grounded on the teacher's
//! `postgres_auth_token_repository.rs` credential-row mapping.

use async_trait::async_trait;
use casare_application::{ApiKeyId, ApiKeyRecord, ApiKeyRepository};
use casare_core::{AppError, AppResult, TenantId};
use casare_domain::UserId;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for hashed API key credentials.
#[derive(Clone)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ApiKeyRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    user_id: uuid::Uuid,
    secret_hash: String,
    active: bool,
}

impl From<ApiKeyRow> for ApiKeyRecord {
    fn from(row: ApiKeyRow) -> Self {
        ApiKeyRecord {
            id: ApiKeyId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            user_id: UserId::from_uuid(row.user_id),
            secret_hash: row.secret_hash,
            active: row.active,
        }
    }
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn create_api_key(&self, record: ApiKeyRecord) -> AppResult<ApiKeyRecord> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, tenant_id, user_id, secret_hash, active)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(record.user_id.as_uuid())
        .bind(&record.secret_hash)
        .bind(record.active)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create api key: {error}")))?;

        Ok(record)
    }

    async fn find_api_key(&self, id: ApiKeyId) -> AppResult<Option<ApiKeyRecord>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"SELECT * FROM api_keys WHERE id = $1"#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load api key: {error}")))?;

        Ok(row.map(ApiKeyRecord::from))
    }

    async fn revoke_api_key(&self, id: ApiKeyId) -> AppResult<()> {
        let affected = sqlx::query(
            r#"UPDATE api_keys SET active = false WHERE id = $1"#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to revoke api key: {error}")))?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound(format!("api key '{id}' not found")));
        }

        Ok(())
    }
}
