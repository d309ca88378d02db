use std::str::FromStr;

use casare_core::{define_uuid_id, AppError, AppResult, TenantId};
use serde::{Deserialize, Serialize};

define_uuid_id!(
    /// Identifier for a user or API-key principal.
    UserId
);
define_uuid_id!(
    /// Identifier for a role, system-seeded or tenant-custom.
    RoleId
);
define_uuid_id!(
    /// Identifier for a tenant membership binding a user to a role.
    MembershipId
);

/// A (resource, action) pair a Role may grant. Immutable and closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Create or update workflow definitions and versions.
    WorkflowWrite,
    /// Read workflow definitions and versions.
    WorkflowRead,
    /// Submit, cancel, or otherwise mutate jobs.
    JobWrite,
    /// Read job state and history.
    JobRead,
    /// Register or deregister robots.
    RobotCreate,
    /// Read robot registry state and heartbeats.
    RobotRead,
    /// Create or modify schedules, calendars, and dependency edges.
    ScheduleWrite,
    /// Read schedules, calendars, and execution history.
    ScheduleRead,
    /// Read audit log entries.
    AuditRead,
    /// Manage tenant roles, memberships, and quotas.
    TenantAdmin,
}

impl Permission {
    /// Returns a stable storage value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowWrite => "workflow.write",
            Self::WorkflowRead => "workflow.read",
            Self::JobWrite => "job.write",
            Self::JobRead => "job.read",
            Self::RobotCreate => "robot.create",
            Self::RobotRead => "robot.read",
            Self::ScheduleWrite => "schedule.write",
            Self::ScheduleRead => "schedule.read",
            Self::AuditRead => "audit.read",
            Self::TenantAdmin => "tenant.admin",
        }
    }

    /// Returns all known permissions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::WorkflowWrite,
            Permission::WorkflowRead,
            Permission::JobWrite,
            Permission::JobRead,
            Permission::RobotCreate,
            Permission::RobotRead,
            Permission::ScheduleWrite,
            Permission::ScheduleRead,
            Permission::AuditRead,
            Permission::TenantAdmin,
        ];

        ALL
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "workflow.write" => Ok(Self::WorkflowWrite),
            "workflow.read" => Ok(Self::WorkflowRead),
            "job.write" => Ok(Self::JobWrite),
            "job.read" => Ok(Self::JobRead),
            "robot.create" => Ok(Self::RobotCreate),
            "robot.read" => Ok(Self::RobotRead),
            "schedule.write" => Ok(Self::ScheduleWrite),
            "schedule.read" => Ok(Self::ScheduleRead),
            "audit.read" => Ok(Self::AuditRead),
            "tenant.admin" => Ok(Self::TenantAdmin),
            _ => Err(AppError::Validation(format!(
                "unknown permission value '{value}'"
            ))),
        }
    }
}

/// A named collection of permissions. System roles are seeded once, have no
/// owning tenant, and cannot be mutated; custom roles are tenant rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    tenant_id: Option<TenantId>,
    name: String,
    permissions: Vec<Permission>,
    priority: i32,
}

impl Role {
    /// Returns the four fixed system roles, seeded with permission sets
    /// that cannot be altered at runtime.
    #[must_use]
    pub fn system_roles() -> Vec<Role> {
        vec![
            Role {
                id: RoleId::new(),
                tenant_id: None,
                name: "admin".to_owned(),
                permissions: Permission::all().to_vec(),
                priority: 0,
            },
            Role {
                id: RoleId::new(),
                tenant_id: None,
                name: "developer".to_owned(),
                permissions: vec![
                    Permission::WorkflowWrite,
                    Permission::WorkflowRead,
                    Permission::JobWrite,
                    Permission::JobRead,
                    Permission::RobotRead,
                    Permission::ScheduleWrite,
                    Permission::ScheduleRead,
                ],
                priority: 1,
            },
            Role {
                id: RoleId::new(),
                tenant_id: None,
                name: "operator".to_owned(),
                permissions: vec![
                    Permission::JobWrite,
                    Permission::JobRead,
                    Permission::RobotCreate,
                    Permission::RobotRead,
                    Permission::ScheduleRead,
                ],
                priority: 2,
            },
            Role {
                id: RoleId::new(),
                tenant_id: None,
                name: "viewer".to_owned(),
                permissions: vec![
                    Permission::WorkflowRead,
                    Permission::JobRead,
                    Permission::RobotRead,
                    Permission::ScheduleRead,
                    Permission::AuditRead,
                ],
                priority: 3,
            },
        ]
    }

    /// Creates a tenant-custom role.
    pub fn new_custom(
        tenant_id: TenantId,
        name: impl Into<String>,
        permissions: Vec<Permission>,
        priority: i32,
    ) -> AppResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AppError::Validation("role name must not be empty".to_owned()));
        }

        Ok(Self {
            id: RoleId::new(),
            tenant_id: Some(tenant_id),
            name,
            permissions,
            priority,
        })
    }

    /// Reconstructs a role from persisted fields without re-running
    /// creation-time validation (used by repository `FromRow` mappings).
    #[must_use]
    pub fn from_parts(
        id: RoleId,
        tenant_id: Option<TenantId>,
        name: String,
        permissions: Vec<Permission>,
        priority: i32,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            permissions,
            priority,
        }
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the owning tenant, or `None` for a system role.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Returns `true` if this is a fixed, non-mutable system role.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// Returns the role's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the permissions granted by this role.
    #[must_use]
    pub fn permissions(&self) -> &[Permission] {
        self.permissions.as_slice()
    }

    /// Returns `true` if the role grants `permission`.
    #[must_use]
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Returns the UI ordering priority. Does not imply permission
    /// inheritance between roles.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Binds a user to a tenant with a single role. Every authenticated request
/// resolves to exactly one `(tenant, principal, role)` tuple via an active
/// membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    id: MembershipId,
    tenant_id: TenantId,
    user_id: UserId,
    role_id: RoleId,
    active: bool,
}

impl Membership {
    /// Creates a new active membership.
    #[must_use]
    pub fn new(tenant_id: TenantId, user_id: UserId, role_id: RoleId) -> Self {
        Self {
            id: MembershipId::new(),
            tenant_id,
            user_id,
            role_id,
            active: true,
        }
    }

    /// Reconstructs a membership from persisted fields without re-running
    /// creation-time defaults (used by repository `FromRow` mappings).
    #[must_use]
    pub fn from_parts(
        id: MembershipId,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        active: bool,
    ) -> Self {
        Self {
            id,
            tenant_id,
            user_id,
            role_id,
            active,
        }
    }

    /// Returns the membership identifier.
    #[must_use]
    pub fn id(&self) -> MembershipId {
        self.id
    }

    /// Returns the tenant this membership grants access to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the member user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the role bound to this membership.
    #[must_use]
    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    /// Returns `true` if the membership is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Deactivates the membership, revoking access to the tenant.
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{Membership, Permission, Role, RoleId, TenantId, UserId};

    #[test]
    fn permission_roundtrips_storage_value() {
        let permission = Permission::JobWrite;
        let restored = Permission::from_str(permission.as_str());
        assert_eq!(restored.expect("parses"), permission);
    }

    #[test]
    fn unknown_permission_is_rejected() {
        assert!(Permission::from_str("job.unknown").is_err());
    }

    #[test]
    fn system_roles_cannot_be_tenant_scoped() {
        for role in Role::system_roles() {
            assert!(role.is_system());
        }
    }

    #[test]
    fn membership_can_be_deactivated() {
        let mut membership = Membership::new(TenantId::new(), UserId::new(), RoleId::new());
        assert!(membership.is_active());
        membership.deactivate();
        assert!(!membership.is_active());
    }
}
