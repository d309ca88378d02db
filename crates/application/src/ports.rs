mod api_key_repository;
mod audit_repository;
mod calendar_repository;
mod job_queue_repository;
mod lease_coordinator;
mod rate_limit_repository;
mod robot_repository;
mod schedule_repository;
mod tenant_repository;
mod workflow_repository;

pub use api_key_repository::{ApiKeyId, ApiKeyRecord, ApiKeyRepository};
pub use audit_repository::{AuditMerkleRoot, AuditRepository, ChainVerification};
pub use calendar_repository::CalendarRepository;
pub use job_queue_repository::{ClaimedJob, DlqRow, EnqueueJobInput, JobQueueRepository};
pub use lease_coordinator::{DispatcherLease, DispatcherLeaseCoordinator};
pub use rate_limit_repository::RateLimitRepository;
pub use robot_repository::{RobotRepository, SelectionPolicy};
pub use schedule_repository::ScheduleRepository;
pub use tenant_repository::TenantRepository;
pub use workflow_repository::WorkflowRepository;
