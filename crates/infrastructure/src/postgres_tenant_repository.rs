//! PostgreSQL-backed tenant, role, and membership repository, grounded on
//! the teacher's `postgres_tenant_repository.rs` connection-pool wiring and
//! `postgres_authorization_repository.rs`'s permission-array row mapping.

use std::str::FromStr;

use async_trait::async_trait;
use casare_application::TenantRepository;
use casare_core::{AppError, AppResult, NonEmptyString, TenantId};
use casare_domain::{
    Membership, MembershipId, Permission, Quotas, Role, RoleId, SubscriptionTier, Tenant,
    TenantStatus, UsageCounters, UserId,
};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for tenants, roles, and memberships.
#[derive(Clone)]
pub struct PostgresTenantRepository {
    pool: PgPool,
}

impl PostgresTenantRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TenantRow {
    id: uuid::Uuid,
    slug: String,
    display_name: String,
    status: String,
    tier: String,
    max_workflows: i64,
    max_robots: i64,
    max_executions_per_hour: i64,
    max_storage_bytes: i64,
    max_team_members: i64,
    current_workflow_count: i64,
    current_robot_count: i64,
    executions_this_hour: i64,
    storage_bytes: i64,
    team_member_count: i64,
}

impl TenantRow {
    fn into_tenant(self) -> AppResult<Tenant> {
        let quotas = Quotas {
            max_workflows: u32::try_from(self.max_workflows)
                .map_err(|error| AppError::Internal(format!("invalid max_workflows: {error}")))?,
            max_robots: u32::try_from(self.max_robots)
                .map_err(|error| AppError::Internal(format!("invalid max_robots: {error}")))?,
            max_executions_per_hour: u32::try_from(self.max_executions_per_hour).map_err(|error| {
                AppError::Internal(format!("invalid max_executions_per_hour: {error}"))
            })?,
            max_storage_bytes: u64::try_from(self.max_storage_bytes)
                .map_err(|error| AppError::Internal(format!("invalid max_storage_bytes: {error}")))?,
            max_team_members: u32::try_from(self.max_team_members)
                .map_err(|error| AppError::Internal(format!("invalid max_team_members: {error}")))?,
        };

        let usage = UsageCounters {
            current_workflow_count: u32::try_from(self.current_workflow_count).map_err(|error| {
                AppError::Internal(format!("invalid current_workflow_count: {error}"))
            })?,
            current_robot_count: u32::try_from(self.current_robot_count).map_err(|error| {
                AppError::Internal(format!("invalid current_robot_count: {error}"))
            })?,
            executions_this_hour: u32::try_from(self.executions_this_hour).map_err(|error| {
                AppError::Internal(format!("invalid executions_this_hour: {error}"))
            })?,
            storage_bytes: u64::try_from(self.storage_bytes)
                .map_err(|error| AppError::Internal(format!("invalid storage_bytes: {error}")))?,
            team_member_count: u32::try_from(self.team_member_count).map_err(|error| {
                AppError::Internal(format!("invalid team_member_count: {error}"))
            })?,
        };

        Ok(Tenant::from_parts(
            TenantId::from_uuid(self.id),
            NonEmptyString::new(self.slug)?,
            NonEmptyString::new(self.display_name)?,
            TenantStatus::parse(self.status.as_str())?,
            SubscriptionTier::parse(self.tier.as_str())?,
            quotas,
            usage,
        ))
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: uuid::Uuid,
    tenant_id: Option<uuid::Uuid>,
    name: String,
    permissions: Vec<String>,
    priority: i32,
}

impl RoleRow {
    fn into_role(self) -> AppResult<Role> {
        let permissions = self
            .permissions
            .into_iter()
            .map(|value| {
                Permission::from_str(value.as_str()).map_err(|error| {
                    AppError::Internal(format!("failed to decode permission '{value}': {error}"))
                })
            })
            .collect::<AppResult<Vec<Permission>>>()?;

        Ok(Role::from_parts(
            RoleId::from_uuid(self.id),
            self.tenant_id.map(TenantId::from_uuid),
            self.name,
            permissions,
            self.priority,
        ))
    }
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    user_id: uuid::Uuid,
    role_id: uuid::Uuid,
    active: bool,
}

impl MembershipRow {
    fn into_membership(self) -> Membership {
        Membership::from_parts(
            MembershipId::from_uuid(self.id),
            TenantId::from_uuid(self.tenant_id),
            UserId::from_uuid(self.user_id),
            RoleId::from_uuid(self.role_id),
            self.active,
        )
    }
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    async fn create_tenant(&self, tenant: Tenant) -> AppResult<Tenant> {
        let quotas = tenant.quotas();
        let usage = tenant.usage();

        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, slug, display_name, status, tier,
                max_workflows, max_robots, max_executions_per_hour,
                max_storage_bytes, max_team_members,
                current_workflow_count, current_robot_count,
                executions_this_hour, storage_bytes, team_member_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(tenant.id().as_uuid())
        .bind(tenant.slug())
        .bind(tenant.display_name())
        .bind(tenant.status().as_str())
        .bind(tenant.tier().as_str())
        .bind(i64::from(quotas.max_workflows))
        .bind(i64::from(quotas.max_robots))
        .bind(i64::from(quotas.max_executions_per_hour))
        .bind(i64::try_from(quotas.max_storage_bytes).unwrap_or(i64::MAX))
        .bind(i64::from(quotas.max_team_members))
        .bind(i64::from(usage.current_workflow_count))
        .bind(i64::from(usage.current_robot_count))
        .bind(i64::from(usage.executions_this_hour))
        .bind(i64::try_from(usage.storage_bytes).unwrap_or(i64::MAX))
        .bind(i64::from(usage.team_member_count))
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create tenant: {error}")))?;

        Ok(tenant)
    }

    async fn find_tenant(&self, tenant_id: TenantId) -> AppResult<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"SELECT * FROM tenants WHERE id = $1"#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load tenant: {error}")))?;

        row.map(TenantRow::into_tenant).transpose()
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> AppResult<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"SELECT * FROM tenants WHERE slug = $1"#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load tenant by slug: {error}")))?;

        row.map(TenantRow::into_tenant).transpose()
    }

    async fn list_active_tenants(&self) -> AppResult<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>(
            r#"SELECT * FROM tenants WHERE status = 'active' ORDER BY slug ASC"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list active tenants: {error}")))?;

        rows.into_iter().map(TenantRow::into_tenant).collect()
    }

    async fn update_tenant(&self, tenant: Tenant) -> AppResult<Tenant> {
        let quotas = tenant.quotas();
        let usage = tenant.usage();

        let affected = sqlx::query(
            r#"
            UPDATE tenants
            SET display_name = $2, status = $3, tier = $4,
                max_workflows = $5, max_robots = $6, max_executions_per_hour = $7,
                max_storage_bytes = $8, max_team_members = $9,
                current_workflow_count = $10, current_robot_count = $11,
                executions_this_hour = $12, storage_bytes = $13, team_member_count = $14
            WHERE id = $1
            "#,
        )
        .bind(tenant.id().as_uuid())
        .bind(tenant.display_name())
        .bind(tenant.status().as_str())
        .bind(tenant.tier().as_str())
        .bind(i64::from(quotas.max_workflows))
        .bind(i64::from(quotas.max_robots))
        .bind(i64::from(quotas.max_executions_per_hour))
        .bind(i64::try_from(quotas.max_storage_bytes).unwrap_or(i64::MAX))
        .bind(i64::from(quotas.max_team_members))
        .bind(i64::from(usage.current_workflow_count))
        .bind(i64::from(usage.current_robot_count))
        .bind(i64::from(usage.executions_this_hour))
        .bind(i64::try_from(usage.storage_bytes).unwrap_or(i64::MAX))
        .bind(i64::from(usage.team_member_count))
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update tenant: {error}")))?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound(format!(
                "tenant '{}' not found",
                tenant.id()
            )));
        }

        Ok(tenant)
    }

    async fn create_role(&self, role: Role) -> AppResult<Role> {
        let permission_values: Vec<&'static str> =
            role.permissions().iter().map(Permission::as_str).collect();

        sqlx::query(
            r#"
            INSERT INTO roles (id, tenant_id, name, permissions, priority)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.tenant_id().map(|tenant_id| tenant_id.as_uuid()))
        .bind(role.name())
        .bind(&permission_values)
        .bind(role.priority())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create role: {error}")))?;

        Ok(role)
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"SELECT * FROM roles WHERE id = $1"#,
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;

        row.map(RoleRow::into_role).transpose()
    }

    async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT * FROM roles
            WHERE tenant_id IS NULL OR tenant_id = $1
            ORDER BY priority ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        rows.into_iter().map(RoleRow::into_role).collect()
    }

    async fn create_membership(&self, membership: Membership) -> AppResult<Membership> {
        sqlx::query(
            r#"
            INSERT INTO memberships (id, tenant_id, user_id, role_id, active)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(membership.id().as_uuid())
        .bind(membership.tenant_id().as_uuid())
        .bind(membership.user_id().as_uuid())
        .bind(membership.role_id().as_uuid())
        .bind(membership.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create membership: {error}")))?;

        Ok(membership)
    }

    async fn find_membership(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT * FROM memberships
            WHERE tenant_id = $1 AND user_id = $2 AND active
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load membership: {error}")))?;

        Ok(row.map(MembershipRow::into_membership))
    }

    async fn update_membership(&self, membership: Membership) -> AppResult<Membership> {
        let affected = sqlx::query(
            r#"UPDATE memberships SET active = $2 WHERE id = $1"#,
        )
        .bind(membership.id().as_uuid())
        .bind(membership.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update membership: {error}")))?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound(format!(
                "membership '{}' not found",
                membership.id()
            )));
        }

        Ok(membership)
    }
}
