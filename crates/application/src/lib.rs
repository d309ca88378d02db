//! Application services and ports.

#![forbid(unsafe_code)]

mod audit_log_service;
mod calendar_service;
mod dispatcher_service;
mod error_classification;
mod job_queue_service;
mod ports;
mod robot_registry_service;
mod robot_session_service;
mod schedule_engine_service;
mod tenant_gateway_service;
mod workflow_version_service;

pub use audit_log_service::AuditLogService;
pub use calendar_service::CalendarService;
pub use dispatcher_service::{DispatchOutcome, DispatcherService};
pub use error_classification::{classify, ErrorClassification, Severity};
pub use job_queue_service::JobQueueService;
pub use ports::{
    ApiKeyId, ApiKeyRecord, ApiKeyRepository, AuditMerkleRoot, AuditRepository, CalendarRepository,
    ChainVerification, ClaimedJob, DispatcherLease, DispatcherLeaseCoordinator, DlqRow,
    EnqueueJobInput, JobQueueRepository, RateLimitRepository, RobotRepository, ScheduleRepository,
    SelectionPolicy, TenantRepository, WorkflowRepository,
};
pub use robot_registry_service::RobotRegistryService;
pub use robot_session_service::{RobotFrame, RobotSessionRegistry};
pub use schedule_engine_service::{
    ConditionEvaluator, FireDecision, NextFireCalculator, ScheduleEngineService, SuppressReason,
};
pub use tenant_gateway_service::{PasswordHasher, TenantGatewayService};
pub use workflow_version_service::WorkflowVersionService;
