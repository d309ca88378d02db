use async_trait::async_trait;
use casare_core::{AppResult, TenantId};
use casare_domain::AuditLogEntry;
use chrono::{DateTime, Utc};

/// A computed Merkle root over a contiguous range of audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditMerkleRoot {
    /// First sequence id covered (inclusive).
    pub start_id: u64,
    /// Last sequence id covered (inclusive).
    pub end_id: u64,
    /// Number of entries covered.
    pub entry_count: u64,
    /// The computed Merkle root digest.
    pub root: [u8; 32],
    /// The time the root was computed.
    pub computed_at: DateTime<Utc>,
}

/// Result of verifying a contiguous audit range's hash chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainVerification {
    /// Whether every entry's stored `entry_hash` matched its recomputed
    /// value and every `previous_hash` matched the prior entry.
    pub is_valid: bool,
    /// The first sequence id at which verification failed, if any.
    pub first_invalid_id: Option<u64>,
}

/// Repository port for the append-only, hash-chained audit log.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends one entry. The repository is the single writer serializing
    /// inserts so the hash chain is never interleaved.
    async fn append(&self, entry: AuditLogEntry) -> AppResult<AuditLogEntry>;

    /// Returns the most recently written entry, used to compute the next
    /// entry's `previous_hash`.
    async fn last_entry(&self) -> AppResult<Option<AuditLogEntry>>;

    /// Returns entries in `[start_id, end_id]` for a tenant (or
    /// system-wide entries when `tenant_id` is `None`), ordered by
    /// sequence id.
    async fn read_range(
        &self,
        tenant_id: Option<TenantId>,
        start_id: u64,
        end_id: u64,
    ) -> AppResult<Vec<AuditLogEntry>>;

    /// Records a computed Merkle root for a contiguous range.
    async fn record_merkle_root(&self, root: AuditMerkleRoot) -> AppResult<()>;

    /// Returns the highest sequence id covered by any recorded Merkle
    /// root, so the audit-root computer knows where to resume.
    async fn last_rooted_sequence_id(&self) -> AppResult<Option<u64>>;

    /// Returns the current highest sequence id in the log.
    async fn latest_sequence_id(&self) -> AppResult<Option<u64>>;
}
