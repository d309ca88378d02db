//! Periodically roots the audit hash chain with a Merkle root over the
//! latest un-rooted batch, amortizing the cost of later full-chain
//! verification.

use async_trait::async_trait;
use casare_application::AuditLogService;
use casare_core::AppResult;
use chrono::Utc;
use tracing::info;

use super::PeriodicTask;

/// Periodic task computing audit log Merkle roots.
pub struct AuditRootTask {
    audit_log: AuditLogService,
}

impl AuditRootTask {
    /// Creates a new audit root task.
    #[must_use]
    pub fn new(audit_log: AuditLogService) -> Self {
        Self { audit_log }
    }
}

#[async_trait]
impl PeriodicTask for AuditRootTask {
    fn scope_key(&self) -> &str {
        "audit-root"
    }

    async fn tick(&self) -> AppResult<()> {
        if let Some(root) = self.audit_log.maybe_compute_root(Utc::now()).await? {
            info!(
                start_id = root.start_id,
                end_id = root.end_id,
                entry_count = root.entry_count,
                "computed audit log merkle root"
            );
        }

        Ok(())
    }
}
