use std::sync::Arc;

use casare_application::{
    AuditLogService, CalendarService, DispatcherService, JobQueueService, RobotRegistryService,
    RobotSessionRegistry, ScheduleEngineService, TenantGatewayService, WorkflowVersionService,
};
use casare_core::AppError;
use casare_infrastructure::{
    Argon2ApiKeyHasher, CronNextFireCalculator, PostgresApiKeyRepository, PostgresAuditRepository,
    PostgresCalendarRepository, PostgresJobQueueRepository, PostgresRobotRepository,
    PostgresScheduleRepository, PostgresTenantRepository, PostgresWorkflowRepository,
    RedisRateLimitRepository, RedisRobotFrameBus, StandardConditionEvaluator,
};
use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::state::AppState;

/// Builds the shared `AppState` every handler runs against, wiring the
/// Postgres/Redis-backed adapters behind each application service's ports.
pub fn build_app_state(pool: PgPool, config: &ApiConfig) -> Result<AppState, AppError> {
    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    let tenant_repository = Arc::new(PostgresTenantRepository::new(pool.clone()));
    let api_key_repository = Arc::new(PostgresApiKeyRepository::new(pool.clone()));
    let job_queue_repository = Arc::new(PostgresJobQueueRepository::new(pool.clone()));
    let robot_repository = Arc::new(PostgresRobotRepository::new(pool.clone()));
    let workflow_repository = Arc::new(PostgresWorkflowRepository::new(pool.clone()));
    let schedule_repository = Arc::new(PostgresScheduleRepository::new(pool.clone()));
    let calendar_repository = Arc::new(PostgresCalendarRepository::new(pool.clone()));
    let audit_repository = Arc::new(PostgresAuditRepository::new(pool.clone()));
    let rate_limit_repository =
        Arc::new(RedisRateLimitRepository::new(redis_client.clone(), "casare:ratelimit"));

    let tenant_gateway = TenantGatewayService::new(
        tenant_repository,
        api_key_repository,
        Arc::new(Argon2ApiKeyHasher::new()),
    );

    let workflow_versions =
        WorkflowVersionService::new(workflow_repository, tenant_gateway.clone());
    let job_queue = JobQueueService::new(job_queue_repository.clone(), tenant_gateway.clone());
    let robots = RobotRegistryService::new(robot_repository.clone(), tenant_gateway.clone());
    let dispatcher = DispatcherService::new(job_queue_repository, robot_repository);
    let schedules = ScheduleEngineService::new(
        schedule_repository,
        calendar_repository.clone(),
        rate_limit_repository,
        Arc::new(CronNextFireCalculator::new()),
        Arc::new(StandardConditionEvaluator::new(
            pool.clone(),
            reqwest::Client::new(),
        )),
    );
    let audit_log = AuditLogService::new(audit_repository);
    let calendars = CalendarService::new(calendar_repository);
    let robot_frame_bus = Arc::new(RedisRobotFrameBus::new(redis_client, "casare:robot-frames"));

    Ok(AppState {
        tenant_gateway,
        workflow_versions,
        job_queue,
        robots,
        dispatcher,
        schedules,
        calendars,
        audit_log,
        robot_sessions: Arc::new(RobotSessionRegistry::new()),
        robot_frame_bus,
        default_lease_seconds: config.default_lease_seconds,
        default_claim_limit: config.default_claim_limit,
    })
}
