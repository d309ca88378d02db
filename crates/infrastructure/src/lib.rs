//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod argon2_api_key_hasher;
mod condition_evaluator;
mod cron_evaluator;
mod postgres_api_key_repository;
mod postgres_audit_repository;
mod postgres_calendar_repository;
mod postgres_job_queue_repository;
mod postgres_robot_repository;
mod postgres_schedule_repository;
mod postgres_tenant_repository;
mod postgres_workflow_repository;
mod redis_lease_coordinator;
mod redis_rate_limit_repository;
mod robot_frame_bus;
mod robot_session_codec;
mod tenant_session;

pub use argon2_api_key_hasher::Argon2ApiKeyHasher;
pub use condition_evaluator::StandardConditionEvaluator;
pub use cron_evaluator::CronNextFireCalculator;
pub use postgres_api_key_repository::PostgresApiKeyRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_calendar_repository::PostgresCalendarRepository;
pub use postgres_job_queue_repository::PostgresJobQueueRepository;
pub use postgres_robot_repository::PostgresRobotRepository;
pub use postgres_schedule_repository::PostgresScheduleRepository;
pub use postgres_tenant_repository::PostgresTenantRepository;
pub use postgres_workflow_repository::PostgresWorkflowRepository;
pub use redis_lease_coordinator::RedisLeaseCoordinator;
pub use redis_rate_limit_repository::RedisRateLimitRepository;
pub use robot_frame_bus::{RedisRobotFrameBus, RobotFrameSubscription};
pub use robot_session_codec::{decode_frame, encode_frame};
pub use tenant_session::begin_tenant_scoped;
