use casare_core::{AppError, AppResult, NonEmptyString, TenantId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Newly created, awaiting activation.
    Pending,
    /// Normal operating state.
    Active,
    /// Temporarily blocked, e.g. for non-payment.
    Suspended,
    /// Permanently retired; rows are retained for audit but not writable.
    Archived,
}

impl TenantStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Archived => "archived",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::Validation(format!(
                "unknown tenant status value '{other}'"
            ))),
        }
    }
}

/// Subscription tier controlling default resource quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    /// No-cost tier with minimal quotas.
    Free,
    /// Small-team tier.
    Team,
    /// Mid-market tier.
    Business,
    /// Unlimited-by-default tier, still bounded to guard against runaway usage.
    Enterprise,
}

impl SubscriptionTier {
    /// Returns a stable storage value for this tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Team => "team",
            Self::Business => "business",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parses a stored tier value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "free" => Ok(Self::Free),
            "team" => Ok(Self::Team),
            "business" => Ok(Self::Business),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(AppError::Validation(format!(
                "unknown subscription tier value '{other}'"
            ))),
        }
    }
}

impl SubscriptionTier {
    /// Returns the baseline resource quotas granted to a tenant created on
    /// this tier without explicit overrides.
    #[must_use]
    pub fn default_quota(&self) -> Quotas {
        match self {
            Self::Free => Quotas {
                max_workflows: 3,
                max_robots: 1,
                max_executions_per_hour: 50,
                max_storage_bytes: 100 * 1024 * 1024,
                max_team_members: 2,
            },
            Self::Team => Quotas {
                max_workflows: 25,
                max_robots: 5,
                max_executions_per_hour: 1_000,
                max_storage_bytes: 5 * 1024 * 1024 * 1024,
                max_team_members: 10,
            },
            Self::Business => Quotas {
                max_workflows: 200,
                max_robots: 50,
                max_executions_per_hour: 20_000,
                max_storage_bytes: 100 * 1024 * 1024 * 1024,
                max_team_members: 100,
            },
            Self::Enterprise => Quotas {
                max_workflows: 10_000,
                max_robots: 1_000,
                max_executions_per_hour: 500_000,
                max_storage_bytes: 2 * 1024 * 1024 * 1024 * 1024,
                max_team_members: 10_000,
            },
        }
    }
}

/// Maximum provisioned resource counts for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    /// Maximum number of workflows the tenant may own.
    pub max_workflows: u32,
    /// Maximum number of registered robots.
    pub max_robots: u32,
    /// Maximum job executions started per rolling hour.
    pub max_executions_per_hour: u32,
    /// Maximum total storage, in bytes, across workflow payloads and results.
    pub max_storage_bytes: u64,
    /// Maximum number of team members (users) with an active membership.
    pub max_team_members: u32,
}

/// Current resource consumption counters for a tenant, maintained
/// transactionally alongside resource creation and destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Current number of workflows owned by the tenant.
    pub current_workflow_count: u32,
    /// Current number of registered robots.
    pub current_robot_count: u32,
    /// Executions started within the current rolling hour window.
    pub executions_this_hour: u32,
    /// Bytes currently consumed across workflow payloads and results.
    pub storage_bytes: u64,
    /// Current number of active team memberships.
    pub team_member_count: u32,
}

/// A resource type a quota check is performed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaResource {
    /// Workflow creation.
    Workflow,
    /// Robot registration.
    Robot,
    /// Job execution start.
    Execution,
    /// Storage consumption, in bytes requested.
    StorageBytes(u64),
    /// Team member invitation.
    TeamMember,
}

impl Quotas {
    /// Returns `true` if consuming one more unit of `resource` would stay
    /// within quota, given the tenant's current `usage`.
    #[must_use]
    pub fn allows(&self, usage: &UsageCounters, resource: QuotaResource) -> bool {
        match resource {
            QuotaResource::Workflow => usage.current_workflow_count < self.max_workflows,
            QuotaResource::Robot => usage.current_robot_count < self.max_robots,
            QuotaResource::Execution => usage.executions_this_hour < self.max_executions_per_hour,
            QuotaResource::StorageBytes(requested) => {
                usage.storage_bytes.saturating_add(requested) <= self.max_storage_bytes
            }
            QuotaResource::TeamMember => usage.team_member_count < self.max_team_members,
        }
    }
}

/// A multi-tenant isolation unit. Every tenant-scoped row references exactly
/// one `Tenant`; deleting a tenant cascades to every row it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    id: TenantId,
    slug: NonEmptyString,
    display_name: NonEmptyString,
    status: TenantStatus,
    tier: SubscriptionTier,
    quotas: Quotas,
    usage: UsageCounters,
}

impl Tenant {
    /// Creates a new tenant on the given subscription tier, with quotas
    /// defaulted from the tier unless `quota_overrides` is supplied.
    pub fn new(
        slug: impl Into<String>,
        display_name: impl Into<String>,
        tier: SubscriptionTier,
        quota_overrides: Option<Quotas>,
    ) -> AppResult<Self> {
        let slug = slug.into();
        if !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(AppError::Validation(
                "tenant slug must be lowercase alphanumeric with hyphens".to_owned(),
            ));
        }

        Ok(Self {
            id: TenantId::new(),
            slug: NonEmptyString::new(slug)?,
            display_name: NonEmptyString::new(display_name)?,
            status: TenantStatus::Pending,
            tier,
            quotas: quota_overrides.unwrap_or_else(|| tier.default_quota()),
            usage: UsageCounters::default(),
        })
    }

    /// Reconstructs a tenant from persisted fields without re-running
    /// creation-time validation (used by repository `FromRow` mappings).
    #[must_use]
    pub fn from_parts(
        id: TenantId,
        slug: NonEmptyString,
        display_name: NonEmptyString,
        status: TenantStatus,
        tier: SubscriptionTier,
        quotas: Quotas,
        usage: UsageCounters,
    ) -> Self {
        Self {
            id,
            slug,
            display_name,
            status,
            tier,
            quotas,
            usage,
        }
    }

    /// Returns the tenant identifier.
    #[must_use]
    pub fn id(&self) -> TenantId {
        self.id
    }

    /// Returns the tenant's URL-safe slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        self.slug.as_str()
    }

    /// Returns the tenant's display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the tenant's current lifecycle status.
    #[must_use]
    pub fn status(&self) -> TenantStatus {
        self.status
    }

    /// Returns the tenant's subscription tier.
    #[must_use]
    pub fn tier(&self) -> SubscriptionTier {
        self.tier
    }

    /// Returns the tenant's provisioned quotas.
    #[must_use]
    pub fn quotas(&self) -> Quotas {
        self.quotas
    }

    /// Returns the tenant's current usage counters.
    #[must_use]
    pub fn usage(&self) -> UsageCounters {
        self.usage
    }

    /// Returns `true` if the tenant may currently accept mutating requests.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self.status, TenantStatus::Active)
    }

    /// Returns `true` if creating one more unit of `resource` stays within
    /// quota.
    #[must_use]
    pub fn check_quota(&self, resource: QuotaResource) -> bool {
        self.quotas.allows(&self.usage, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::{QuotaResource, SubscriptionTier, Tenant, UsageCounters};

    #[test]
    fn rejects_uppercase_slug() {
        let result = Tenant::new("Acme", "Acme Corp", SubscriptionTier::Free, None);
        assert!(result.is_err());
    }

    #[test]
    fn free_tier_quota_blocks_second_robot() {
        let tenant = Tenant::new("acme", "Acme Corp", SubscriptionTier::Free, None)
            .expect("valid tenant");
        let usage = UsageCounters {
            current_robot_count: 1,
            ..UsageCounters::default()
        };
        assert!(!tenant.quotas().allows(&usage, QuotaResource::Robot));
    }

    #[test]
    fn new_tenant_starts_pending_and_not_writable() {
        let tenant = Tenant::new("acme", "Acme Corp", SubscriptionTier::Team, None)
            .expect("valid tenant");
        assert!(!tenant.is_writable());
    }
}
