use std::sync::Arc;

use casare_application::{
    AuditLogService, CalendarService, DispatcherService, JobQueueService, RobotRegistryService,
    RobotSessionRegistry, ScheduleEngineService, TenantGatewayService, WorkflowVersionService,
};
use casare_infrastructure::RedisRobotFrameBus;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub tenant_gateway: TenantGatewayService,
    pub workflow_versions: WorkflowVersionService,
    pub job_queue: JobQueueService,
    pub robots: RobotRegistryService,
    pub dispatcher: DispatcherService,
    pub schedules: ScheduleEngineService,
    pub calendars: CalendarService,
    pub audit_log: AuditLogService,
    pub robot_sessions: Arc<RobotSessionRegistry>,
    /// Cross-process relay carrying `JobAssign`/`JobCancel` frames
    /// published by `casare-orchestrator-dispatcher` to whichever api
    /// instance is holding the target robot's websocket.
    pub robot_frame_bus: Arc<RedisRobotFrameBus>,
    pub default_lease_seconds: u32,
    pub default_claim_limit: u32,
}
