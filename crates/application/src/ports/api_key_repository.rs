use async_trait::async_trait;
use casare_core::{define_uuid_id, AppResult, TenantId};
use casare_domain::UserId;

define_uuid_id!(
    /// Identifier for a stored API key.
    ApiKeyId
);

/// A persisted, hashed API key bound to a tenant and principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    /// The key's identifier.
    pub id: ApiKeyId,
    /// The tenant this key authenticates into.
    pub tenant_id: TenantId,
    /// The principal this key resolves to.
    pub user_id: UserId,
    /// Argon2id PHC-formatted hash of the secret.
    pub secret_hash: String,
    /// Whether the key is currently usable.
    pub active: bool,
}

/// Repository port for API-key credential storage backing the bearer-token
/// authentication mechanism used by the orchestrator API.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Persists a newly issued API key record.
    async fn create_api_key(&self, record: ApiKeyRecord) -> AppResult<ApiKeyRecord>;

    /// Looks up an API key by its stable identifier, embedded in the
    /// presented credential so the repository need not scan every hash.
    async fn find_api_key(&self, id: ApiKeyId) -> AppResult<Option<ApiKeyRecord>>;

    /// Revokes an API key, making future authentication attempts fail.
    async fn revoke_api_key(&self, id: ApiKeyId) -> AppResult<()>;
}
