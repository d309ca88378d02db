use async_trait::async_trait;
use casare_core::{AppResult, TenantId};
use casare_domain::{Membership, Role, RoleId, Tenant, UserId};

/// Repository port for tenants, memberships, and roles (the Tenant & RBAC
/// Gateway's storage needs).
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Persists a newly created tenant.
    async fn create_tenant(&self, tenant: Tenant) -> AppResult<Tenant>;

    /// Returns a tenant by id.
    async fn find_tenant(&self, tenant_id: TenantId) -> AppResult<Option<Tenant>>;

    /// Returns a tenant by its unique slug.
    async fn find_tenant_by_slug(&self, slug: &str) -> AppResult<Option<Tenant>>;

    /// Lists every tenant in `Active` status, for the dispatcher's
    /// cross-tenant assignment tick and the schedule ticker's due-fire
    /// sweep.
    async fn list_active_tenants(&self) -> AppResult<Vec<Tenant>>;

    /// Persists an updated tenant (status, quotas, or usage counters).
    async fn update_tenant(&self, tenant: Tenant) -> AppResult<Tenant>;

    /// Creates a custom role for a tenant.
    async fn create_role(&self, role: Role) -> AppResult<Role>;

    /// Returns a role by id, including system roles.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Lists every role visible within a tenant (system roles plus the
    /// tenant's own custom roles).
    async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>>;

    /// Creates a membership binding a user to a tenant with a role.
    async fn create_membership(&self, membership: Membership) -> AppResult<Membership>;

    /// Returns the active membership, if any, binding `user_id` to
    /// `tenant_id`.
    async fn find_membership(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<Option<Membership>>;

    /// Persists an updated membership (e.g. deactivation).
    async fn update_membership(&self, membership: Membership) -> AppResult<Membership>;
}
