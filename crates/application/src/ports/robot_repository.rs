use async_trait::async_trait;
use casare_core::{AppResult, TenantId};
use casare_domain::{Capability, Heartbeat, Robot, RobotId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Candidate-ranking policy used by `select_candidates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Prefer the robot with the fewest current jobs.
    LeastLoaded,
    /// Prefer the robot whose capability set most tightly matches the
    /// requirement (smallest superset).
    CapabilityTightest,
    /// Prefer a robot that has recently completed the same workflow
    /// successfully.
    Stickiness {
        /// The workflow the candidate is being selected to run, used to
        /// consult recent-success history.
        workflow_id: casare_domain::WorkflowId,
    },
}

/// Repository port for the robot registry and its heartbeat stream.
#[async_trait]
pub trait RobotRepository: Send + Sync {
    /// Registers a new robot.
    async fn register(&self, robot: Robot) -> AppResult<Robot>;

    /// Records a heartbeat, updating the robot's `last_seen`, status, and
    /// current job set.
    async fn record_heartbeat(&self, heartbeat: Heartbeat) -> AppResult<()>;

    /// Deregisters a robot, releasing any jobs it still holds back to the
    /// queue.
    async fn deregister(&self, robot_id: RobotId, reason: &str) -> AppResult<()>;

    /// Lists robots for a tenant, optionally filtered by status.
    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<Robot>>;

    /// Returns a robot by id.
    async fn find(&self, robot_id: RobotId) -> AppResult<Option<Robot>>;

    /// Selects up to `count` idle candidate robots satisfying
    /// `required_capabilities`, excluding `exclude`, ranked by `policy`
    /// with ties broken on oldest `last_seen`.
    async fn select_candidates(
        &self,
        tenant_id: TenantId,
        required_capabilities: &BTreeSet<Capability>,
        exclude: &BTreeSet<RobotId>,
        policy: SelectionPolicy,
        count: u32,
    ) -> AppResult<Vec<Robot>>;

    /// Returns every robot whose `last_seen` is older than `liveness_cutoff`
    /// and is not already `Offline`, for the heartbeat watchdog to flip.
    async fn find_stale(&self, liveness_cutoff: DateTime<Utc>) -> AppResult<Vec<Robot>>;

    /// Marks a robot `Offline` after a missed liveness window.
    async fn mark_offline(&self, robot_id: RobotId) -> AppResult<Robot>;

    /// Persists an updated robot (job assignment/release, failure
    /// acknowledgment).
    async fn update(&self, robot: Robot) -> AppResult<Robot>;
}
