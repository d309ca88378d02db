use std::sync::Arc;

use casare_application::{
    AuditLogService, DispatcherLeaseCoordinator, DispatcherService, JobQueueService,
    RobotRegistryService, ScheduleEngineService, TenantGatewayService, TenantRepository,
    WorkflowVersionService,
};
use casare_infrastructure::RedisRobotFrameBus;

use crate::config::DispatcherConfig;
use crate::tasks::{
    AuditRootTask, DispatcherTickTask, DlqSweepTask, HeartbeatWatchdogTask, ScheduleTickerTask,
};

/// Every background task the dispatcher process runs, bundled with the
/// coordination primitives shared across them.
pub struct DispatcherContext {
    pub lease_coordinator: Arc<dyn DispatcherLeaseCoordinator>,
    pub holder_id: String,
    pub coordination_lease_seconds: u32,
    pub dispatcher_tick: Arc<DispatcherTickTask>,
    pub schedule_ticker: Arc<ScheduleTickerTask>,
    pub heartbeat_watchdog: Arc<HeartbeatWatchdogTask>,
    pub audit_root: Arc<AuditRootTask>,
    pub dlq_sweep: Arc<DlqSweepTask>,
}

/// Wires every port adapter and application service the dispatcher's
/// background tasks depend on, mirroring the way
/// `casare-orchestrator-api`'s state builder assembles the same services
/// against the shared Postgres/Redis backends.
#[allow(clippy::too_many_arguments)]
pub fn build_dispatcher_context(
    pool: sqlx::PgPool,
    redis_client: redis::Client,
    config: &DispatcherConfig,
) -> Result<DispatcherContext, casare_core::AppError> {
    use casare_infrastructure::{
        Argon2ApiKeyHasher, CronNextFireCalculator, PostgresApiKeyRepository,
        PostgresAuditRepository, PostgresCalendarRepository, PostgresJobQueueRepository,
        PostgresRobotRepository, PostgresScheduleRepository, PostgresTenantRepository,
        PostgresWorkflowRepository, RedisLeaseCoordinator, RedisRateLimitRepository,
        StandardConditionEvaluator,
    };

    let tenant_repository: Arc<dyn TenantRepository> =
        Arc::new(PostgresTenantRepository::new(pool.clone()));
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
        tenant_repository.clone(),
        api_key_repository,
        Arc::new(Argon2ApiKeyHasher::new()),
    );

    let workflow_versions = WorkflowVersionService::new(workflow_repository, tenant_gateway.clone());
    let job_queue = JobQueueService::new(job_queue_repository.clone(), tenant_gateway.clone());
    let robots = RobotRegistryService::new(robot_repository.clone(), tenant_gateway);
    let dispatcher = DispatcherService::new(job_queue_repository, robot_repository);
    let schedules = ScheduleEngineService::new(
        schedule_repository,
        calendar_repository.clone(),
        rate_limit_repository,
        Arc::new(CronNextFireCalculator::new()),
        Arc::new(StandardConditionEvaluator::new(pool.clone(), reqwest::Client::new())),
    );
    let audit_log = AuditLogService::new(audit_repository);
    let frame_bus = Arc::new(RedisRobotFrameBus::new(redis_client.clone(), "casare:robot-frames"));

    let lease_coordinator: Arc<dyn DispatcherLeaseCoordinator> =
        Arc::new(RedisLeaseCoordinator::new(redis_client, "casare:dispatcher-lease"));

    let dispatcher_tick = Arc::new(DispatcherTickTask::new(
        tenant_repository.clone(),
        robots.clone(),
        job_queue.clone(),
        dispatcher,
        workflow_versions.clone(),
        audit_log.clone(),
        frame_bus,
        config.default_lease_seconds,
    ));

    let schedule_ticker = Arc::new(ScheduleTickerTask::new(
        schedules,
        workflow_versions,
        job_queue.clone(),
        audit_log.clone(),
        config.default_job_max_retries,
        config.schedule_max_catchup_runs,
        config.schedule_catchup_window_seconds,
    ));

    let heartbeat_watchdog = Arc::new(HeartbeatWatchdogTask::new(
        job_queue.clone(),
        robots,
        audit_log.clone(),
        config.robot_liveness_window_seconds,
    ));

    let audit_root = Arc::new(AuditRootTask::new(audit_log));
    let dlq_sweep = Arc::new(DlqSweepTask::new(job_queue, config.dlq_retention_days));

    Ok(DispatcherContext {
        lease_coordinator,
        holder_id: config.holder_id.clone(),
        coordination_lease_seconds: config.coordination_lease_seconds,
        dispatcher_tick,
        schedule_ticker,
        heartbeat_watchdog,
        audit_root,
        dlq_sweep,
    })
}
