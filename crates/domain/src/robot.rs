use std::collections::BTreeSet;

use casare_core::{define_uuid_id, AppError, AppResult, NonEmptyString, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;

define_uuid_id!(
    /// Identifier for a registered robot.
    RobotId
);

/// A symbolic capability a robot advertises at registration. Drawn from a
/// closed vocabulary plus free-form custom tags.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Chromium-based browser automation.
    BrowserChromium,
    /// Firefox browser automation.
    BrowserFirefox,
    /// WebKit-based browser automation.
    BrowserWebkit,
    /// Desktop UI automation.
    Desktop,
    /// Runs on Windows.
    OsWindows,
    /// Runs on Linux.
    OsLinux,
    /// Runs on macOS.
    OsMacos,
    /// An operator-defined free-form tag.
    Custom(String),
}

impl Capability {
    /// Returns a stable storage value for this capability.
    #[must_use]
    pub fn as_storage_string(&self) -> String {
        match self {
            Self::BrowserChromium => "browser_chromium".to_owned(),
            Self::BrowserFirefox => "browser_firefox".to_owned(),
            Self::BrowserWebkit => "browser_webkit".to_owned(),
            Self::Desktop => "desktop".to_owned(),
            Self::OsWindows => "os_windows".to_owned(),
            Self::OsLinux => "os_linux".to_owned(),
            Self::OsMacos => "os_macos".to_owned(),
            Self::Custom(tag) => format!("custom:{tag}"),
        }
    }

    /// Parses a stored capability value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "browser_chromium" => Self::BrowserChromium,
            "browser_firefox" => Self::BrowserFirefox,
            "browser_webkit" => Self::BrowserWebkit,
            "desktop" => Self::Desktop,
            "os_windows" => Self::OsWindows,
            "os_linux" => Self::OsLinux,
            "os_macos" => Self::OsMacos,
            other => Self::Custom(other.strip_prefix("custom:").unwrap_or(other).to_owned()),
        }
    }
}

/// Current liveness/assignment state of a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    /// Connected, within one job of `max_concurrent`, eligible for
    /// assignment.
    Idle,
    /// Holding at least one in-flight job.
    Busy,
    /// Missed its liveness window; in-flight jobs are being reclaimed.
    Offline,
    /// Reported an unrecoverable local failure; requires operator
    /// acknowledgment before it may be reassigned work.
    Failed,
}

impl RobotStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Offline => "offline",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "idle" => Ok(Self::Idle),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::Validation(format!(
                "unknown robot status value '{other}'"
            ))),
        }
    }
}

/// A registered worker process that accepts and executes workflow jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Robot {
    id: RobotId,
    tenant_id: TenantId,
    name: NonEmptyString,
    hostname: NonEmptyString,
    capabilities: BTreeSet<Capability>,
    status: RobotStatus,
    current_jobs: BTreeSet<JobId>,
    max_concurrent: u32,
    last_seen: DateTime<Utc>,
    registered_at: DateTime<Utc>,
}

impl Robot {
    /// Registers a new robot in `Idle` status.
    pub fn register(
        tenant_id: TenantId,
        name: impl Into<String>,
        hostname: impl Into<String>,
        capabilities: BTreeSet<Capability>,
        max_concurrent: u32,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        if max_concurrent == 0 {
            return Err(AppError::Validation(
                "max_concurrent must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            id: RobotId::new(),
            tenant_id,
            name: NonEmptyString::new(name)?,
            hostname: NonEmptyString::new(hostname)?,
            capabilities,
            status: RobotStatus::Idle,
            current_jobs: BTreeSet::new(),
            max_concurrent,
            last_seen: now,
            registered_at: now,
        })
    }

    /// Reconstructs a robot from persisted fields without re-running
    /// creation-time validation (used by repository `FromRow` mappings).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: RobotId,
        tenant_id: TenantId,
        name: NonEmptyString,
        hostname: NonEmptyString,
        capabilities: BTreeSet<Capability>,
        status: RobotStatus,
        current_jobs: BTreeSet<JobId>,
        max_concurrent: u32,
        last_seen: DateTime<Utc>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            hostname,
            capabilities,
            status,
            current_jobs,
            max_concurrent,
            last_seen,
            registered_at,
        }
    }

    /// Returns the robot identifier.
    #[must_use]
    pub fn id(&self) -> RobotId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the robot's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the robot's reported hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        self.hostname.as_str()
    }

    /// Returns the capabilities this robot advertises.
    #[must_use]
    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    /// Returns `true` if `required` is a subset of this robot's advertised
    /// capabilities.
    #[must_use]
    pub fn satisfies(&self, required: &BTreeSet<Capability>) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// Returns the robot's current liveness/assignment status.
    #[must_use]
    pub fn status(&self) -> RobotStatus {
        self.status
    }

    /// Returns the jobs currently leased to this robot.
    #[must_use]
    pub fn current_jobs(&self) -> &BTreeSet<JobId> {
        &self.current_jobs
    }

    /// Returns the maximum number of concurrent jobs this robot accepts.
    #[must_use]
    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }

    /// Returns the time of the robot's last heartbeat.
    #[must_use]
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Returns `true` if this robot has spare capacity for one more job.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        matches!(self.status, RobotStatus::Idle | RobotStatus::Busy)
            && (self.current_jobs.len() as u32) < self.max_concurrent
    }

    /// Records a heartbeat, refreshing `last_seen` and optionally updating
    /// reported status. A robot previously `Offline` returning a heartbeat
    /// transitions back to `Idle` or `Busy` based on its current job set.
    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_seen = at;
        if self.status == RobotStatus::Offline {
            self.status = if self.current_jobs.is_empty() {
                RobotStatus::Idle
            } else {
                RobotStatus::Busy
            };
        }
    }

    /// Assigns `job` to this robot, failing if it has no spare capacity.
    /// Invariant: `status = Busy` implies at least one current job.
    pub fn assign_job(&mut self, job: JobId) -> AppResult<()> {
        if !self.has_capacity() {
            return Err(AppError::Conflict(
                "robot has no spare capacity for another job".to_owned(),
            ));
        }

        self.current_jobs.insert(job);
        self.status = RobotStatus::Busy;
        Ok(())
    }

    /// Releases `job` from this robot (on completion, failure, or
    /// reclaim), returning to `Idle` if no jobs remain.
    pub fn release_job(&mut self, job: JobId) {
        self.current_jobs.remove(&job);
        if self.current_jobs.is_empty() && self.status == RobotStatus::Busy {
            self.status = RobotStatus::Idle;
        }
    }

    /// Marks the robot `Offline` because its liveness window elapsed.
    /// Invariant: no further claim may be granted while offline. Callers
    /// must separately reclaim each job in `current_jobs`.
    pub fn mark_offline(&mut self) {
        self.status = RobotStatus::Offline;
    }

    /// Marks the robot `Failed`, requiring operator acknowledgment before
    /// it becomes eligible for assignment again.
    pub fn mark_failed(&mut self) {
        self.status = RobotStatus::Failed;
    }

    /// Operator acknowledgment clearing a `Failed` status back to `Idle`.
    pub fn acknowledge_failure(&mut self) -> AppResult<()> {
        if self.status != RobotStatus::Failed {
            return Err(AppError::Conflict(
                "only a failed robot may be acknowledged".to_owned(),
            ));
        }

        self.current_jobs.clear();
        self.status = RobotStatus::Idle;
        Ok(())
    }
}

/// A periodic liveness/progress observation reported by a robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    robot_id: RobotId,
    job_id: Option<JobId>,
    progress_percent: Option<u8>,
    current_node_id: Option<String>,
    memory_bytes: u64,
    cpu_percent: f32,
    timestamp: DateTime<Utc>,
}

impl Heartbeat {
    /// Creates a new heartbeat observation.
    pub fn new(
        robot_id: RobotId,
        job_id: Option<JobId>,
        progress_percent: Option<u8>,
        current_node_id: Option<String>,
        memory_bytes: u64,
        cpu_percent: f32,
        timestamp: DateTime<Utc>,
    ) -> AppResult<Self> {
        if let Some(progress) = progress_percent {
            if progress > 100 {
                return Err(AppError::Validation(
                    "progress_percent must be 0..=100".to_owned(),
                ));
            }
        }

        Ok(Self {
            robot_id,
            job_id,
            progress_percent,
            current_node_id,
            memory_bytes,
            cpu_percent,
            timestamp,
        })
    }

    /// Returns the reporting robot.
    #[must_use]
    pub fn robot_id(&self) -> RobotId {
        self.robot_id
    }

    /// Returns the job this heartbeat reports progress for, if any.
    #[must_use]
    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    /// Returns the reported progress percentage, if any.
    #[must_use]
    pub fn progress_percent(&self) -> Option<u8> {
        self.progress_percent
    }

    /// Returns the observation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::{Capability, Heartbeat, Robot, RobotStatus};
    use casare_core::TenantId;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn new_robot(max_concurrent: u32) -> Robot {
        let mut capabilities = BTreeSet::new();
        capabilities.insert(Capability::BrowserChromium);
        Robot::register(
            TenantId::new(),
            "robot-1",
            "host-1",
            capabilities,
            max_concurrent,
            Utc::now(),
        )
        .expect("valid robot")
    }

    #[test]
    fn busy_status_requires_at_least_one_job() {
        let mut robot = new_robot(2);
        let job = crate::job::JobId::new();
        robot.assign_job(job).expect("assign");
        assert_eq!(robot.status(), RobotStatus::Busy);
        assert!(!robot.current_jobs().is_empty());
    }

    #[test]
    fn offline_robot_cannot_accept_capacity_check() {
        let mut robot = new_robot(2);
        robot.mark_offline();
        assert!(!robot.has_capacity());
    }

    #[test]
    fn heartbeat_rejects_out_of_range_progress() {
        let result = Heartbeat::new(
            crate::robot::RobotId::new(),
            None,
            Some(150),
            None,
            0,
            0.0,
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn robot_returning_from_offline_recomputes_status() {
        let mut robot = new_robot(2);
        let job = crate::job::JobId::new();
        robot.assign_job(job).expect("assign");
        robot.mark_offline();
        robot.record_heartbeat(Utc::now());
        assert_eq!(robot.status(), RobotStatus::Busy);
    }
}
