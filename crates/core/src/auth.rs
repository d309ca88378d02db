use serde::{Deserialize, Serialize};

use crate::TenantId;

/// Authenticated caller identity, resolved from an API key or operator
/// session and bound to exactly one tenant for the lifetime of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    subject: String,
    display_name: String,
    tenant_id: TenantId,
    roles: Vec<String>,
}

impl Principal {
    /// Creates a principal from authentication and tenancy data.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        display_name: impl Into<String>,
        tenant_id: TenantId,
        roles: Vec<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            display_name: display_name.into(),
            tenant_id,
            roles,
        }
    }

    /// Returns the stable subject claim for the principal.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the display name for the principal.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the tenant the principal is scoped to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the role names granted to the principal within its tenant.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        self.roles.as_slice()
    }

    /// Returns `true` if the principal holds the named role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|held| held == role)
    }
}
