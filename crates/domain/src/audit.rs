use casare_core::{define_uuid_id, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

define_uuid_id!(
    /// Identifier for an audit log entry, independent of its monotonic
    /// sequence id.
    AuditLogEntryId
);

/// Stable action names emitted by every mutating code path in the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A job was enqueued.
    JobEnqueued,
    /// A job was leased to a robot.
    JobAssigned,
    /// A job completed successfully.
    JobCompleted,
    /// A job failed (retryably or terminally).
    JobFailed,
    /// A job was moved to the dead-letter queue.
    JobDeadLettered,
    /// A job was cancelled.
    JobCancelled,
    /// A workflow was created.
    WorkflowCreated,
    /// A workflow version was activated.
    WorkflowVersionActivated,
    /// A robot registered.
    RobotRegistered,
    /// A robot was marked offline after a missed liveness window.
    RobotMarkedOffline,
    /// A schedule fired.
    ScheduleFired,
    /// A schedule fire was suppressed by a gate (blackout, rate limit,
    /// condition, or dependency).
    ScheduleSuppressed,
    /// A tenant's quota was exceeded.
    QuotaExceeded,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobEnqueued => "job_enqueued",
            Self::JobAssigned => "job_assigned",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::JobDeadLettered => "job_dead_lettered",
            Self::JobCancelled => "job_cancelled",
            Self::WorkflowCreated => "workflow_created",
            Self::WorkflowVersionActivated => "workflow_version_activated",
            Self::RobotRegistered => "robot_registered",
            Self::RobotMarkedOffline => "robot_marked_offline",
            Self::ScheduleFired => "schedule_fired",
            Self::ScheduleSuppressed => "schedule_suppressed",
            Self::QuotaExceeded => "quota_exceeded",
        }
    }

    /// Parses a stored action value.
    pub fn parse(value: &str) -> casare_core::AppResult<Self> {
        match value {
            "job_enqueued" => Ok(Self::JobEnqueued),
            "job_assigned" => Ok(Self::JobAssigned),
            "job_completed" => Ok(Self::JobCompleted),
            "job_failed" => Ok(Self::JobFailed),
            "job_dead_lettered" => Ok(Self::JobDeadLettered),
            "job_cancelled" => Ok(Self::JobCancelled),
            "workflow_created" => Ok(Self::WorkflowCreated),
            "workflow_version_activated" => Ok(Self::WorkflowVersionActivated),
            "robot_registered" => Ok(Self::RobotRegistered),
            "robot_marked_offline" => Ok(Self::RobotMarkedOffline),
            "schedule_fired" => Ok(Self::ScheduleFired),
            "schedule_suppressed" => Ok(Self::ScheduleSuppressed),
            "quota_exceeded" => Ok(Self::QuotaExceeded),
            other => Err(casare_core::AppError::Validation(format!(
                "unknown audit action value '{other}'"
            ))),
        }
    }
}

/// The kind and identity of the actor that performed an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActorRef {
    /// A human or API-key principal.
    User {
        /// The actor's identifier, as a string for storage-agnostic
        /// comparisons.
        id: String,
    },
    /// A registered robot.
    Robot {
        /// The actor's identifier.
        id: String,
    },
    /// The orchestrator itself (scheduler, dispatcher, watchdog).
    System,
}

/// The kind and identity of the resource an audited action targeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// The resource type name (e.g. `"job"`, `"robot"`, `"schedule"`).
    pub resource_type: String,
    /// The resource identifier, as a string.
    pub resource_id: String,
}

/// A single append-only audit log row.
///
/// Invariants: entries are immutable once written; `entry_hash` is the
/// SHA-256 of a canonical serialization of every other field including
/// `previous_hash`; the genesis `previous_hash` is 32 zero bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    sequence_id: u64,
    entry_id: AuditLogEntryId,
    timestamp: DateTime<Utc>,
    action: AuditAction,
    actor: ActorRef,
    resource: ResourceRef,
    tenant_id: Option<TenantId>,
    details: Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    previous_hash: [u8; 32],
    entry_hash: [u8; 32],
}

impl AuditLogEntry {
    /// Assembles an audit entry. `entry_hash` must already have been
    /// computed by the caller (`casare_application::audit_log_service`)
    /// over the canonical serialization of every other field; this
    /// constructor does not hash, keeping the domain crate free of a
    /// hashing dependency.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        sequence_id: u64,
        entry_id: AuditLogEntryId,
        timestamp: DateTime<Utc>,
        action: AuditAction,
        actor: ActorRef,
        resource: ResourceRef,
        tenant_id: Option<TenantId>,
        details: Value,
        ip_address: Option<String>,
        user_agent: Option<String>,
        previous_hash: [u8; 32],
        entry_hash: [u8; 32],
    ) -> Self {
        Self {
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
        }
    }

    /// Returns the monotonic sequence id, used to order and range-query the
    /// chain.
    #[must_use]
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Returns the entry's stable UUID.
    #[must_use]
    pub fn entry_id(&self) -> AuditLogEntryId {
        self.entry_id
    }

    /// Returns the time this entry was recorded.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the actor that performed the audited action.
    #[must_use]
    pub fn actor(&self) -> &ActorRef {
        &self.actor
    }

    /// Returns the resource the audited action targeted.
    #[must_use]
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// Returns the action-specific detail payload.
    #[must_use]
    pub fn details(&self) -> &Value {
        &self.details
    }

    /// Returns the caller's IP address, if recorded.
    #[must_use]
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Returns the caller's user agent, if recorded.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Returns the hash of the entry immediately preceding this one in the
    /// chain.
    #[must_use]
    pub fn previous_hash(&self) -> [u8; 32] {
        self.previous_hash
    }

    /// Returns this entry's own content hash.
    #[must_use]
    pub fn entry_hash(&self) -> [u8; 32] {
        self.entry_hash
    }

    /// Returns the tenant this entry is scoped to, or `None` for a
    /// system-wide entry visible across tenants.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Returns the action this entry records.
    #[must_use]
    pub fn action(&self) -> AuditAction {
        self.action
    }

    /// Returns the 32 zero bytes used as the genesis `previous_hash`.
    #[must_use]
    pub fn genesis_hash() -> [u8; 32] {
        [0u8; 32]
    }
}

#[cfg(test)]
mod tests {
    use super::AuditLogEntry;

    #[test]
    fn genesis_hash_is_all_zero() {
        assert_eq!(AuditLogEntry::genesis_hash(), [0u8; 32]);
    }
}
