//! Domain entities and invariants for the orchestrator control plane.
//!
//! Every type here is pure: no I/O, no async, no knowledge of Postgres or
//! Redis. Persistence adapters in `casare-infrastructure` map these types
//! to and from rows; application services in `casare-application` hold the
//! state-machine logic that spans more than one entity.

#![forbid(unsafe_code)]

pub mod audit;
pub mod calendar;
pub mod execution_history;
pub mod job;
pub mod robot;
pub mod schedule;
pub mod security;
pub mod tenant;
pub mod workflow;

pub use audit::{ActorRef, AuditAction, AuditLogEntry, AuditLogEntryId, ResourceRef};
pub use calendar::{
    BlackoutPeriod, BlackoutPeriodId, BusinessCalendar, BusinessCalendarId, OutsideHoursPolicy,
    WeekdayHours,
};
pub use execution_history::ExecutionHistoryRecord;
pub use job::{Job, JobFailureCategory, JobId, JobPriority, JobStatus, TriggerType};
pub use robot::{Capability, Heartbeat, Robot, RobotId, RobotStatus};
pub use schedule::{
    CatchupConfig, ConditionConfig, ConditionRetryPolicy, DependencyCompletion, DependencyEdge,
    EventKind, RateLimitConfig, RateLimitDecision, Schedule, ScheduleId, ScheduleStatus,
    ScheduleType, SlaConfig, SlaStatus,
};
pub use security::{Membership, MembershipId, Permission, Role, RoleId, UserId};
pub use tenant::{QuotaResource, Quotas, SubscriptionTier, Tenant, TenantStatus, UsageCounters};
pub use workflow::{
    JobVersionPin, VersionStatus, Workflow, WorkflowId, WorkflowStatus, WorkflowVersion,
    WorkflowVersionId,
};
