use async_trait::async_trait;
use casare_core::AppResult;

/// A held distributed lease, identified by the scope it was acquired for
/// and a token used for safe release/renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherLease {
    /// Coordination scope key, e.g. `"dispatcher-tick"`, `"schedule-ticker"`.
    pub scope_key: String,
    /// Opaque token proving ownership, used for compare-and-delete release
    /// and compare-and-renew extension.
    pub token: String,
    /// Identity of the process instance holding the lease.
    pub holder_id: String,
}

/// Distributed coordination port electing a single active holder per scope
/// key across horizontally scaled `casare-orchestrator-dispatcher`
/// instances, so only one instance runs a given periodic task at a time.
#[async_trait]
pub trait DispatcherLeaseCoordinator: Send + Sync {
    /// Attempts to acquire the lease for `scope_key`. Returns `None` if
    /// another holder currently owns it.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<DispatcherLease>>;

    /// Releases a held lease via compare-and-delete on its token.
    async fn release_lease(&self, lease: &DispatcherLease) -> AppResult<()>;

    /// Renews a held lease via compare-and-extend on its token. Returns
    /// `false` if the token no longer matches (ownership was lost).
    async fn renew_lease(&self, lease: &DispatcherLease, lease_seconds: u32) -> AppResult<bool>;
}
