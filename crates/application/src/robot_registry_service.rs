//! Robot registry and heartbeat liveness tracking, grounded on the
//! teacher's `upsert_worker_heartbeat` `ON CONFLICT (worker_id) DO UPDATE`
//! path but extended with capability-based candidate selection and an
//! offline watchdog sweep.

use std::collections::BTreeSet;
use std::sync::Arc;

use casare_core::{AppResult, TenantId};
use casare_domain::{Capability, Heartbeat, QuotaResource, Robot, RobotId};
use chrono::{DateTime, Utc};

use crate::ports::{RobotRepository, SelectionPolicy};
use crate::tenant_gateway_service::TenantGatewayService;

/// Application service for robot registration, heartbeats, and candidate
/// selection.
#[derive(Clone)]
pub struct RobotRegistryService {
    repository: Arc<dyn RobotRepository>,
    tenant_gateway: TenantGatewayService,
}

impl RobotRegistryService {
    /// Creates a new robot registry service.
    #[must_use]
    pub fn new(repository: Arc<dyn RobotRepository>, tenant_gateway: TenantGatewayService) -> Self {
        Self {
            repository,
            tenant_gateway,
        }
    }

    /// Registers a new robot after asserting the tenant has not exhausted
    /// its robot quota.
    pub async fn register(&self, robot: Robot) -> AppResult<Robot> {
        self.tenant_gateway
            .check_quota(robot.tenant_id(), QuotaResource::Robot)
            .await?;

        self.repository.register(robot).await
    }

    /// Records a heartbeat from a robot.
    pub async fn record_heartbeat(&self, heartbeat: Heartbeat) -> AppResult<()> {
        self.repository.record_heartbeat(heartbeat).await
    }

    /// Deregisters a robot, releasing any jobs it still holds.
    pub async fn deregister(&self, robot_id: RobotId, reason: &str) -> AppResult<()> {
        self.repository.deregister(robot_id, reason).await
    }

    /// Lists robots for a tenant.
    pub async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<Robot>> {
        self.repository.list(tenant_id).await
    }

    /// Returns a robot by id.
    pub async fn find(&self, robot_id: RobotId) -> AppResult<Option<Robot>> {
        self.repository.find(robot_id).await
    }

    /// Selects up to `count` idle candidates satisfying
    /// `required_capabilities`, used by the dispatcher's assignment loop.
    pub async fn select_candidates(
        &self,
        tenant_id: TenantId,
        required_capabilities: &BTreeSet<Capability>,
        exclude: &BTreeSet<RobotId>,
        policy: SelectionPolicy,
        count: u32,
    ) -> AppResult<Vec<Robot>> {
        self.repository
            .select_candidates(tenant_id, required_capabilities, exclude, policy, count)
            .await
    }

    /// Flips every robot whose `last_seen` is older than `liveness_window`
    /// before `now` to `Offline`, for the heartbeat watchdog background
    /// task. Returns the number of robots flipped.
    pub async fn sweep_stale_robots(
        &self,
        now: DateTime<Utc>,
        liveness_window: chrono::Duration,
    ) -> AppResult<u32> {
        let cutoff = now - liveness_window;
        let stale = self.repository.find_stale(cutoff).await?;
        let mut flipped = 0;

        for robot in stale {
            self.repository.mark_offline(robot.id()).await?;
            flipped += 1;
        }

        Ok(flipped)
    }
}
