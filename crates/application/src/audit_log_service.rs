//! Append-only, hash-chained audit log, grounded on the teacher's
//! `postgres_app_repository` single-writer append pattern, generalized from
//! row versioning to a SHA-256 hash chain. The chain's own hashing is kept
//! here rather than in `casare-domain`: `AuditLogEntry` is an immutable
//! value once constructed, so the caller assembling it must already know
//! `previous_hash` and `entry_hash`.

use std::sync::Arc;

use casare_core::{AppResult, TenantId};
use casare_domain::{ActorRef, AuditAction, AuditLogEntry, AuditLogEntryId, ResourceRef};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ports::{AuditMerkleRoot, AuditRepository, ChainVerification};

/// The number of un-rooted entries at which `maybe_compute_root` should
/// compute and record a new Merkle root, amortizing verification cost.
const MERKLE_ROOTING_BATCH_SIZE: u64 = 1_000;

/// Application service appending to and verifying the audit chain.
#[derive(Clone)]
pub struct AuditLogService {
    repository: Arc<dyn AuditRepository>,
}

impl AuditLogService {
    /// Creates a new audit log service.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    /// Records one audited action, computing its place in the hash chain
    /// before handing an already-hashed, immutable entry to the
    /// repository.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        timestamp: DateTime<Utc>,
        action: AuditAction,
        actor: ActorRef,
        resource: ResourceRef,
        tenant_id: Option<TenantId>,
        details: Value,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AppResult<AuditLogEntry> {
        let previous = self.repository.last_entry().await?;
        let previous_hash = previous
            .as_ref()
            .map(AuditLogEntry::entry_hash)
            .unwrap_or_else(AuditLogEntry::genesis_hash);
        let sequence_id = previous.as_ref().map_or(1, |entry| entry.sequence_id() + 1);
        let entry_id = AuditLogEntryId::new();

        let entry_hash = hash_fields(
            sequence_id,
            entry_id,
            timestamp,
            action,
            &actor,
            &resource,
            tenant_id,
            &details,
            ip_address.as_deref(),
            user_agent.as_deref(),
            previous_hash,
        );

        let entry = AuditLogEntry::new(
            sequence_id,
            entry_id,
            timestamp,
            action,
            actor,
            resource,
            tenant_id,
            details,
            ip_address,
            user_agent,
            previous_hash,
            entry_hash,
        );

        self.repository.append(entry).await
    }

    /// Returns entries in `[start_id, end_id]` visible to `tenant_id` (or
    /// system-wide entries when `None`).
    pub async fn read_range(
        &self,
        tenant_id: Option<TenantId>,
        start_id: u64,
        end_id: u64,
    ) -> AppResult<Vec<AuditLogEntry>> {
        self.repository.read_range(tenant_id, start_id, end_id).await
    }

    /// Verifies that every entry in `[start_id, end_id]` re-hashes to its
    /// own stored `entry_hash` and links to its predecessor's `entry_hash`,
    /// independent of any previously recorded Merkle root. Intended for
    /// on-demand verification requests, not the periodic rooting job.
    ///
    /// Both checks matter: the per-entry re-hash detects a direct mutation
    /// of a row's fields (e.g. `details`) that left `entry_hash` and
    /// `previous_hash` untouched; the continuity check detects a spliced
    /// or reordered row whose own hash is internally consistent but no
    /// longer chains to its predecessor.
    pub async fn verify_chain(
        &self,
        tenant_id: Option<TenantId>,
        start_id: u64,
        end_id: u64,
    ) -> AppResult<ChainVerification> {
        let entries = self.repository.read_range(tenant_id, start_id, end_id).await?;

        let mut expected_previous: Option<[u8; 32]> = None;
        for entry in &entries {
            let recomputed = hash_fields(
                entry.sequence_id(),
                entry.entry_id(),
                entry.timestamp(),
                entry.action(),
                entry.actor(),
                entry.resource(),
                entry.tenant_id(),
                entry.details(),
                entry.ip_address(),
                entry.user_agent(),
                entry.previous_hash(),
            );

            if recomputed != entry.entry_hash() {
                return Ok(ChainVerification {
                    is_valid: false,
                    first_invalid_id: Some(entry.sequence_id()),
                });
            }

            if let Some(expected) = expected_previous {
                if entry.previous_hash() != expected {
                    return Ok(ChainVerification {
                        is_valid: false,
                        first_invalid_id: Some(entry.sequence_id()),
                    });
                }
            }

            expected_previous = Some(entry.entry_hash());
        }

        Ok(ChainVerification { is_valid: true, first_invalid_id: None })
    }

    /// Computes and records a Merkle root over the next un-rooted batch of
    /// entries, if at least `MERKLE_ROOTING_BATCH_SIZE` have accumulated
    /// since the last root. Returns the newly recorded root, if any.
    pub async fn maybe_compute_root(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AuditMerkleRoot>> {
        let latest = match self.repository.latest_sequence_id().await? {
            Some(id) => id,
            None => return Ok(None),
        };
        let start_id = self.repository.last_rooted_sequence_id().await?.map_or(1, |id| id + 1);

        if latest < start_id || latest - start_id + 1 < MERKLE_ROOTING_BATCH_SIZE {
            return Ok(None);
        }

        let entries = self.repository.read_range(None, start_id, latest).await?;
        if entries.is_empty() {
            return Ok(None);
        }

        let leaves: Vec<[u8; 32]> = entries.iter().map(AuditLogEntry::entry_hash).collect();
        let root = merkle_root(&leaves);

        let recorded = AuditMerkleRoot {
            start_id,
            end_id: latest,
            entry_count: entries.len() as u64,
            root,
            computed_at: now,
        };

        self.repository.record_merkle_root(recorded).await?;
        Ok(Some(recorded))
    }
}

#[allow(clippy::too_many_arguments)]
fn hash_fields(
    sequence_id: u64,
    entry_id: AuditLogEntryId,
    timestamp: DateTime<Utc>,
    action: AuditAction,
    actor: &ActorRef,
    resource: &ResourceRef,
    tenant_id: Option<TenantId>,
    details: &Value,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    previous_hash: [u8; 32],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(sequence_id.to_be_bytes());
    hasher.update(entry_id.to_string().as_bytes());
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(action_name(action).as_bytes());
    hasher.update(serde_json::to_vec(actor).unwrap_or_default());
    hasher.update(serde_json::to_vec(resource).unwrap_or_default());
    hasher.update(tenant_id.map(|id| id.to_string()).unwrap_or_default().as_bytes());
    hasher.update(serde_json::to_vec(details).unwrap_or_default());
    hasher.update(ip_address.unwrap_or_default().as_bytes());
    hasher.update(user_agent.unwrap_or_default().as_bytes());
    hasher.update(previous_hash);

    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn action_name(action: AuditAction) -> &'static str {
    match action {
        AuditAction::JobEnqueued => "job_enqueued",
        AuditAction::JobAssigned => "job_assigned",
        AuditAction::JobCompleted => "job_completed",
        AuditAction::JobFailed => "job_failed",
        AuditAction::JobDeadLettered => "job_dead_lettered",
        AuditAction::JobCancelled => "job_cancelled",
        AuditAction::WorkflowCreated => "workflow_created",
        AuditAction::WorkflowVersionActivated => "workflow_version_activated",
        AuditAction::RobotRegistered => "robot_registered",
        AuditAction::RobotMarkedOffline => "robot_marked_offline",
        AuditAction::ScheduleFired => "schedule_fired",
        AuditAction::ScheduleSuppressed => "schedule_suppressed",
        AuditAction::QuotaExceeded => "quota_exceeded",
    }
}

/// Builds a binary Merkle root over `leaves`, duplicating the last leaf at
/// each level with an odd count.
fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    let mut level = leaves.to_vec();
    if level.is_empty() {
        return [0u8; 32];
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(pair[0]);
            hasher.update(pair.get(1).copied().unwrap_or(pair[0]));
            let digest = hasher.finalize();
            let mut combined = [0u8; 32];
            combined.copy_from_slice(&digest);
            next.push(combined);
        }
        level = next;
    }

    level[0]
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct FakeAuditRepository {
        entries: Mutex<Vec<AuditLogEntry>>,
        roots: Mutex<Vec<AuditMerkleRoot>>,
    }

    #[async_trait]
    impl AuditRepository for FakeAuditRepository {
        async fn append(&self, entry: AuditLogEntry) -> AppResult<AuditLogEntry> {
            let mut entries = self.entries.lock().unwrap();
            entries.push(entry.clone());
            Ok(entry)
        }

        async fn last_entry(&self) -> AppResult<Option<AuditLogEntry>> {
            Ok(self.entries.lock().unwrap().last().cloned())
        }

        async fn read_range(
            &self,
            _tenant_id: Option<TenantId>,
            start_id: u64,
            end_id: u64,
        ) -> AppResult<Vec<AuditLogEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|entry| entry.sequence_id() >= start_id && entry.sequence_id() <= end_id)
                .cloned()
                .collect())
        }

        async fn record_merkle_root(&self, root: AuditMerkleRoot) -> AppResult<()> {
            self.roots.lock().unwrap().push(root);
            Ok(())
        }

        async fn last_rooted_sequence_id(&self) -> AppResult<Option<u64>> {
            Ok(self.roots.lock().unwrap().last().map(|root| root.end_id))
        }

        async fn latest_sequence_id(&self) -> AppResult<Option<u64>> {
            Ok(self.entries.lock().unwrap().last().map(AuditLogEntry::sequence_id))
        }
    }

    fn resource() -> ResourceRef {
        ResourceRef { resource_type: "job".to_owned(), resource_id: "job-1".to_owned() }
    }

    #[tokio::test]
    async fn first_entry_chains_from_genesis() {
        let service = AuditLogService::new(Arc::new(FakeAuditRepository::default()));

        let entry = service
            .record(
                Utc::now(),
                AuditAction::JobEnqueued,
                ActorRef::System,
                resource(),
                None,
                Value::Null,
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(entry.sequence_id(), 1);
        assert_eq!(entry.previous_hash(), AuditLogEntry::genesis_hash());
    }

    #[tokio::test]
    async fn second_entry_chains_from_first() {
        let service = AuditLogService::new(Arc::new(FakeAuditRepository::default()));

        let first = service
            .record(
                Utc::now(),
                AuditAction::JobEnqueued,
                ActorRef::System,
                resource(),
                None,
                Value::Null,
                None,
                None,
            )
            .await
            .unwrap();

        let second = service
            .record(
                Utc::now(),
                AuditAction::JobAssigned,
                ActorRef::System,
                resource(),
                None,
                Value::Null,
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(second.sequence_id(), 2);
        assert_eq!(second.previous_hash(), first.entry_hash());
    }

    #[tokio::test]
    async fn verify_chain_detects_a_spliced_previous_hash() {
        let service = AuditLogService::new(Arc::new(FakeAuditRepository::default()));

        service
            .record(
                Utc::now(),
                AuditAction::JobEnqueued,
                ActorRef::System,
                resource(),
                None,
                Value::Null,
                None,
                None,
            )
            .await
            .unwrap();

        service
            .record(
                Utc::now(),
                AuditAction::JobAssigned,
                ActorRef::System,
                resource(),
                None,
                Value::Null,
                None,
                None,
            )
            .await
            .unwrap();

        let verification = service.verify_chain(None, 1, 2).await.unwrap();
        assert!(verification.is_valid);
        assert_eq!(verification.first_invalid_id, None);
    }

    #[tokio::test]
    async fn verify_chain_detects_a_tampered_detail_field() {
        let repository = Arc::new(FakeAuditRepository::default());
        let service = AuditLogService::new(repository.clone());

        service
            .record(
                Utc::now(),
                AuditAction::JobEnqueued,
                ActorRef::System,
                resource(),
                None,
                Value::Null,
                None,
                None,
            )
            .await
            .unwrap();

        let second = service
            .record(
                Utc::now(),
                AuditAction::JobAssigned,
                ActorRef::System,
                resource(),
                None,
                Value::Null,
                None,
                None,
            )
            .await
            .unwrap();

        // Simulate a direct `UPDATE audit_log SET details = ...` that
        // leaves the `entry_hash`/`previous_hash` columns untouched.
        let tampered = AuditLogEntry::new(
            second.sequence_id(),
            second.entry_id(),
            second.timestamp(),
            second.action(),
            second.actor().clone(),
            second.resource().clone(),
            second.tenant_id(),
            serde_json::json!({"tampered": true}),
            second.ip_address().map(str::to_owned),
            second.user_agent().map(str::to_owned),
            second.previous_hash(),
            second.entry_hash(),
        );
        *repository.entries.lock().unwrap().last_mut().unwrap() = tampered;

        let verification = service.verify_chain(None, 1, 2).await.unwrap();
        assert!(!verification.is_valid);
        assert_eq!(verification.first_invalid_id, Some(2));
    }

    #[tokio::test]
    async fn root_is_not_computed_before_the_batch_threshold() {
        let service = AuditLogService::new(Arc::new(FakeAuditRepository::default()));

        service
            .record(
                Utc::now(),
                AuditAction::JobEnqueued,
                ActorRef::System,
                resource(),
                None,
                Value::Null,
                None,
                None,
            )
            .await
            .unwrap();

        let root = service.maybe_compute_root(Utc::now()).await.unwrap();
        assert!(root.is_none());
    }
}
