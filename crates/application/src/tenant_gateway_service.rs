//! Tenant & RBAC gateway: the single entry point every other service and
//! the Control API route through to resolve a presented credential into a
//! tenant-scoped `Principal`, check a permission, and enforce quotas.

use std::sync::Arc;

use async_trait::async_trait;
use casare_core::{AppError, AppResult, Principal, TenantId};
use casare_domain::{Permission, QuotaResource, Tenant};
use uuid::Uuid;

use crate::ports::{ApiKeyId, ApiKeyRepository, TenantRepository};

/// Port for credential hashing operations, keeping the application and
/// domain layers free of a direct dependency on a specific cryptographic
/// crate.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Hashes a plaintext secret using Argon2id.
    fn hash_password(&self, secret: &str) -> AppResult<String>;

    /// Verifies a plaintext secret against a stored Argon2id hash. Must run
    /// in constant time regardless of validity.
    fn verify_password(&self, secret: &str, hash: &str) -> AppResult<bool>;
}

/// A stand-in Argon2id hash checked when no record is found, so that a
/// nonexistent key id costs the same wall-clock time as an existing one
/// with a wrong secret.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Application service for tenant resolution, authentication, permission
/// checks, and quota enforcement.
#[derive(Clone)]
pub struct TenantGatewayService {
    tenant_repository: Arc<dyn TenantRepository>,
    api_key_repository: Arc<dyn ApiKeyRepository>,
    password_hasher: Arc<dyn PasswordHasher>,
}

impl TenantGatewayService {
    /// Creates a new tenant gateway service.
    #[must_use]
    pub fn new(
        tenant_repository: Arc<dyn TenantRepository>,
        api_key_repository: Arc<dyn ApiKeyRepository>,
        password_hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            tenant_repository,
            api_key_repository,
            password_hasher,
        }
    }

    /// Authenticates a presented API key of the form `<key-id>.<secret>`
    /// and resolves it to a tenant-scoped principal carrying the
    /// permissions granted by the caller's membership role.
    ///
    /// Returns a generic `Unauthenticated` error for every failure mode
    /// (malformed key, unknown id, revoked key, wrong secret, inactive
    /// membership) to avoid revealing which of those applies.
    pub async fn authenticate_api_key(&self, presented: &str) -> AppResult<Principal> {
        let (id_part, secret_part) = presented
            .split_once('.')
            .ok_or_else(|| AppError::Unauthenticated("malformed API key".to_owned()))?;

        let key_id = id_part
            .parse::<Uuid>()
            .map(ApiKeyId::from_uuid)
            .map_err(|_| AppError::Unauthenticated("malformed API key".to_owned()))?;

        let record = self.api_key_repository.find_api_key(key_id).await?;

        let Some(record) = record else {
            let _ = self.password_hasher.verify_password(secret_part, DUMMY_HASH);
            return Err(AppError::Unauthenticated("invalid API key".to_owned()));
        };

        if !record.active {
            let _ = self.password_hasher.verify_password(secret_part, DUMMY_HASH);
            return Err(AppError::Unauthenticated("invalid API key".to_owned()));
        }

        let secret_valid = self
            .password_hasher
            .verify_password(secret_part, &record.secret_hash)?;

        if !secret_valid {
            return Err(AppError::Unauthenticated("invalid API key".to_owned()));
        }

        let membership = self
            .tenant_repository
            .find_membership(record.tenant_id, record.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("membership not found".to_owned()))?;

        if !membership.is_active() {
            return Err(AppError::Unauthenticated(
                "membership has been deactivated".to_owned(),
            ));
        }

        let role = self
            .tenant_repository
            .find_role(membership.role_id())
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "membership '{}' references unknown role",
                    membership.id()
                ))
            })?;

        let roles = role
            .permissions()
            .iter()
            .map(|permission| permission.as_str().to_owned())
            .collect();

        Ok(Principal::new(
            record.user_id.to_string(),
            role.name(),
            record.tenant_id,
            roles,
        ))
    }

    /// Asserts that `principal` was granted `permission`, returning
    /// `AppError::Forbidden` otherwise.
    pub fn authorize(&self, principal: &Principal, permission: Permission) -> AppResult<()> {
        if principal.has_role(permission.as_str()) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "subject '{}' is missing permission '{}'",
            principal.subject(),
            permission.as_str()
        )))
    }

    /// Loads the tenant for `tenant_id`, asserting it is active and able to
    /// accept one more unit of `resource` before returning it. Callers
    /// should create the new resource and persist the incremented usage
    /// counter in the same transaction as this check.
    pub async fn check_quota(
        &self,
        tenant_id: TenantId,
        resource: QuotaResource,
    ) -> AppResult<Tenant> {
        let tenant = self
            .tenant_repository
            .find_tenant(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tenant '{tenant_id}' not found")))?;

        if !tenant.is_writable() {
            return Err(AppError::Conflict(format!(
                "tenant '{tenant_id}' is not in an active, writable state"
            )));
        }

        if !tenant.check_quota(resource) {
            return Err(AppError::QuotaExceeded(format!(
                "tenant '{tenant_id}' has exhausted its quota for this resource"
            )));
        }

        Ok(tenant)
    }

    /// Lists every active tenant, for the dispatcher's cross-tenant
    /// assignment and schedule ticks.
    pub async fn list_active_tenants(&self) -> AppResult<Vec<Tenant>> {
        self.tenant_repository.list_active_tenants().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use casare_core::{AppResult, TenantId};
    use casare_domain::{Membership, Role, RoleId, Tenant, UserId};

    use super::*;
    use crate::ports::{ApiKeyRecord, ApiKeyRepository, TenantRepository};

    struct StaticHasher;

    #[async_trait]
    impl PasswordHasher for StaticHasher {
        fn hash_password(&self, secret: &str) -> AppResult<String> {
            Ok(format!("hashed:{secret}"))
        }

        fn verify_password(&self, secret: &str, hash: &str) -> AppResult<bool> {
            Ok(hash == format!("hashed:{secret}"))
        }
    }

    struct FakeApiKeys {
        records: Mutex<HashMap<ApiKeyId, ApiKeyRecord>>,
    }

    #[async_trait]
    impl ApiKeyRepository for FakeApiKeys {
        async fn create_api_key(&self, record: ApiKeyRecord) -> AppResult<ApiKeyRecord> {
            self.records.lock().unwrap().insert(record.id, record.clone());
            Ok(record)
        }

        async fn find_api_key(&self, id: ApiKeyId) -> AppResult<Option<ApiKeyRecord>> {
            Ok(self.records.lock().unwrap().get(&id).cloned())
        }

        async fn revoke_api_key(&self, id: ApiKeyId) -> AppResult<()> {
            if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
                record.active = false;
            }
            Ok(())
        }
    }

    struct FakeTenants {
        tenants: Mutex<HashMap<TenantId, Tenant>>,
        memberships: Mutex<Vec<Membership>>,
        roles: Mutex<HashMap<RoleId, Role>>,
    }

    #[async_trait]
    impl TenantRepository for FakeTenants {
        async fn create_tenant(&self, tenant: Tenant) -> AppResult<Tenant> {
            self.tenants.lock().unwrap().insert(tenant.id(), tenant.clone());
            Ok(tenant)
        }

        async fn find_tenant(&self, tenant_id: TenantId) -> AppResult<Option<Tenant>> {
            Ok(self.tenants.lock().unwrap().get(&tenant_id).cloned())
        }

        async fn find_tenant_by_slug(&self, slug: &str) -> AppResult<Option<Tenant>> {
            Ok(self
                .tenants
                .lock()
                .unwrap()
                .values()
                .find(|tenant| tenant.slug() == slug)
                .cloned())
        }

        async fn update_tenant(&self, tenant: Tenant) -> AppResult<Tenant> {
            self.tenants.lock().unwrap().insert(tenant.id(), tenant.clone());
            Ok(tenant)
        }

        async fn list_active_tenants(&self) -> AppResult<Vec<Tenant>> {
            Ok(self
                .tenants
                .lock()
                .unwrap()
                .values()
                .filter(|tenant| tenant.is_writable())
                .cloned()
                .collect())
        }

        async fn create_role(&self, role: Role) -> AppResult<Role> {
            self.roles.lock().unwrap().insert(role.id(), role.clone());
            Ok(role)
        }

        async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
            Ok(self.roles.lock().unwrap().get(&role_id).cloned())
        }

        async fn list_roles(&self, _tenant_id: TenantId) -> AppResult<Vec<Role>> {
            Ok(self.roles.lock().unwrap().values().cloned().collect())
        }

        async fn create_membership(&self, membership: Membership) -> AppResult<Membership> {
            self.memberships.lock().unwrap().push(membership.clone());
            Ok(membership)
        }

        async fn find_membership(
            &self,
            tenant_id: TenantId,
            user_id: UserId,
        ) -> AppResult<Option<Membership>> {
            Ok(self
                .memberships
                .lock()
                .unwrap()
                .iter()
                .find(|membership| {
                    membership.tenant_id() == tenant_id && membership.user_id() == user_id
                })
                .cloned())
        }

        async fn update_membership(&self, membership: Membership) -> AppResult<Membership> {
            let mut memberships = self.memberships.lock().unwrap();
            if let Some(existing) = memberships
                .iter_mut()
                .find(|candidate| candidate.id() == membership.id())
            {
                *existing = membership.clone();
            }
            Ok(membership)
        }
    }

    fn service_with(
        tenants: FakeTenants,
        api_keys: FakeApiKeys,
    ) -> TenantGatewayService {
        TenantGatewayService::new(
            Arc::new(tenants),
            Arc::new(api_keys),
            Arc::new(StaticHasher),
        )
    }

    #[tokio::test]
    async fn authenticates_valid_api_key_and_grants_role_permissions() {
        use casare_domain::SubscriptionTier;

        let tenant = Tenant::new("acme", "Acme Corp", SubscriptionTier::Team, None).unwrap();
        let user_id = UserId::new();
        let role = Role::system_roles().into_iter().find(|r| r.name() == "viewer").unwrap();
        let membership = Membership::new(tenant.id(), user_id, role.id());

        let key_id = ApiKeyId::new();
        let record = ApiKeyRecord {
            id: key_id,
            tenant_id: tenant.id(),
            user_id,
            secret_hash: "hashed:s3cret".to_owned(),
            active: true,
        };

        let mut tenants_map = HashMap::new();
        tenants_map.insert(tenant.id(), tenant.clone());
        let mut roles_map = HashMap::new();
        roles_map.insert(role.id(), role);

        let service = service_with(
            FakeTenants {
                tenants: Mutex::new(tenants_map),
                memberships: Mutex::new(vec![membership]),
                roles: Mutex::new(roles_map),
            },
            FakeApiKeys {
                records: Mutex::new(HashMap::from([(key_id, record)])),
            },
        );

        let presented = format!("{key_id}.s3cret");
        let principal = service.authenticate_api_key(&presented).await.unwrap();
        assert_eq!(principal.tenant_id(), tenant.id());
        assert!(service.authorize(&principal, Permission::AuditRead).is_ok());
        assert!(service.authorize(&principal, Permission::TenantAdmin).is_err());
    }

    #[tokio::test]
    async fn rejects_malformed_and_unknown_keys() {
        let service = service_with(
            FakeTenants {
                tenants: Mutex::new(HashMap::new()),
                memberships: Mutex::new(Vec::new()),
                roles: Mutex::new(HashMap::new()),
            },
            FakeApiKeys {
                records: Mutex::new(HashMap::new()),
            },
        );

        assert!(service.authenticate_api_key("no-dot-here").await.is_err());
        assert!(service
            .authenticate_api_key(&format!("{}.secret", Uuid::new_v4()))
            .await
            .is_err());
    }
}
