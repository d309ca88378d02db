//! Assignment loop body matching idle robots to due, capability-compatible
//! jobs. Grounded on the teacher's `dispatch.rs` action-matching shape,
//! generalized from "dispatch a workflow action" to "assign a job to a
//! robot", and on the claim semantics in `JobQueueRepository::claim`.

use std::sync::Arc;

use casare_core::AppResult;
use casare_domain::{JobId, Robot, RobotId, RobotStatus};
use chrono::{DateTime, Utc};

use crate::ports::{JobQueueRepository, RobotRepository};

/// Result of one dispatch attempt against a single robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A job was claimed and assigned to the robot.
    Assigned {
        /// The robot the job was assigned to.
        robot_id: RobotId,
        /// The job that was assigned.
        job_id: JobId,
        /// The opaque lease token the robot must present to
        /// heartbeat/complete/fail the job.
        lease_token: String,
        /// The instant the lease expires without a heartbeat.
        lease_expires_at: DateTime<Utc>,
    },
    /// The robot has no spare capacity; no claim was attempted.
    NoCapacity {
        /// The robot that was skipped.
        robot_id: RobotId,
    },
    /// The robot had spare capacity but no due, matching job was claimed.
    NoMatchingJobs {
        /// The robot that found nothing to claim.
        robot_id: RobotId,
    },
}

/// Application service driving the assignment of queued jobs onto idle
/// robots. Holds the job queue and robot repositories directly rather than
/// their higher-level services, since it needs to mutate `Robot` state
/// (job assignment bookkeeping) in lockstep with the claim it just made.
#[derive(Clone)]
pub struct DispatcherService {
    job_queue: Arc<dyn JobQueueRepository>,
    robots: Arc<dyn RobotRepository>,
}

impl DispatcherService {
    /// Creates a new dispatcher service.
    #[must_use]
    pub fn new(job_queue: Arc<dyn JobQueueRepository>, robots: Arc<dyn RobotRepository>) -> Self {
        Self { job_queue, robots }
    }

    /// Attempts to claim and assign work to a single robot, up to its
    /// remaining capacity. Safe to call repeatedly (e.g. on every
    /// heartbeat and on every periodic tick): a robot already at capacity
    /// is skipped without a wasted claim round-trip.
    pub async fn dispatch_to_robot(
        &self,
        robot: &Robot,
        lease_seconds: u32,
    ) -> AppResult<Vec<DispatchOutcome>> {
        if !robot.has_capacity() {
            return Ok(vec![DispatchOutcome::NoCapacity { robot_id: robot.id() }]);
        }

        let available = robot.max_concurrent() - robot.current_jobs().len() as u32;
        let claimed = self
            .job_queue
            .claim(robot.id(), robot.capabilities(), available, lease_seconds)
            .await?;

        if claimed.is_empty() {
            return Ok(vec![DispatchOutcome::NoMatchingJobs { robot_id: robot.id() }]);
        }

        let mut updated = robot.clone();
        let mut outcomes = Vec::with_capacity(claimed.len());

        for claim in claimed {
            updated.assign_job(claim.job.id())?;
            outcomes.push(DispatchOutcome::Assigned {
                robot_id: updated.id(),
                job_id: claim.job.id(),
                lease_token: claim.lease_token,
                lease_expires_at: claim.lease_expires_at,
            });
        }

        self.robots.update(updated).await?;
        Ok(outcomes)
    }

    /// Runs one assignment pass over every robot in `candidates` with
    /// spare capacity, skipping those already `Offline` or `Failed`. Used
    /// by the dispatcher's periodic reconciliation tick for robots that
    /// did not proactively request work over their session.
    pub async fn run_tick(
        &self,
        candidates: &[Robot],
        lease_seconds: u32,
    ) -> AppResult<Vec<DispatchOutcome>> {
        let mut outcomes = Vec::new();

        for robot in candidates {
            if matches!(robot.status(), RobotStatus::Offline | RobotStatus::Failed) {
                continue;
            }

            outcomes.extend(self.dispatch_to_robot(robot, lease_seconds).await?);
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use casare_core::{AppError, AppResult, TenantId};
    use casare_domain::{
        Capability, Heartbeat, Job, JobFailureCategory, JobPriority, TriggerType, WorkflowVersionId,
    };
    use chrono::Utc;
    use serde_json::Value;

    use super::*;
    use crate::ports::{ClaimedJob as PortClaimedJob, DlqRow, EnqueueJobInput, SelectionPolicy};

    struct StubQueue {
        to_claim: Mutex<Vec<PortClaimedJob>>,
    }

    #[async_trait]
    impl JobQueueRepository for StubQueue {
        async fn enqueue(&self, _input: EnqueueJobInput) -> AppResult<Job> {
            Err(AppError::Internal("unused".to_owned()))
        }

        async fn claim(
            &self,
            _robot_id: RobotId,
            _robot_capabilities: &BTreeSet<Capability>,
            max_n: u32,
            _lease_seconds: u32,
        ) -> AppResult<Vec<PortClaimedJob>> {
            let mut claims = self.to_claim.lock().unwrap();
            let take = (max_n as usize).min(claims.len());
            Ok(claims.drain(0..take).collect())
        }

        async fn heartbeat_claim(
            &self,
            _job_id: casare_domain::JobId,
            _robot_id: RobotId,
            _lease_token: &str,
            _lease_seconds: u32,
        ) -> AppResult<DateTime<Utc>> {
            Ok(Utc::now())
        }

        async fn start(
            &self,
            _job_id: casare_domain::JobId,
            _robot_id: RobotId,
            _lease_token: &str,
        ) -> AppResult<Job> {
            Err(AppError::Internal("unused".to_owned()))
        }

        async fn complete(
            &self,
            _job_id: casare_domain::JobId,
            _robot_id: RobotId,
            _lease_token: &str,
            _result: Value,
        ) -> AppResult<Job> {
            Err(AppError::Internal("unused".to_owned()))
        }

        async fn fail(
            &self,
            _job_id: casare_domain::JobId,
            _robot_id: RobotId,
            _lease_token: &str,
            _error: &str,
            _category: JobFailureCategory,
        ) -> AppResult<(Job, Option<DlqRow>)> {
            Err(AppError::Internal("unused".to_owned()))
        }

        async fn cancel(&self, _job_id: casare_domain::JobId, _reason: &str) -> AppResult<Job> {
            Err(AppError::Internal("unused".to_owned()))
        }

        async fn find(&self, _job_id: casare_domain::JobId) -> AppResult<Option<Job>> {
            Ok(None)
        }

        async fn list(&self, _tenant_id: TenantId, _limit: u32, _offset: u32) -> AppResult<Vec<Job>> {
            Ok(Vec::new())
        }

        async fn find_expired_leases(&self, _now: DateTime<Utc>) -> AppResult<Vec<PortClaimedJob>> {
            Ok(Vec::new())
        }

        async fn reclaim(&self, _job_id: casare_domain::JobId) -> AppResult<Job> {
            Err(AppError::Internal("unused".to_owned()))
        }

        async fn purge_dead_letters_older_than(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
            Ok(0)
        }
    }

    struct RecordingRobots {
        updated: Mutex<Vec<Robot>>,
    }

    #[async_trait]
    impl RobotRepository for RecordingRobots {
        async fn register(&self, robot: Robot) -> AppResult<Robot> {
            Ok(robot)
        }

        async fn record_heartbeat(&self, _heartbeat: Heartbeat) -> AppResult<()> {
            Ok(())
        }

        async fn deregister(&self, _robot_id: RobotId, _reason: &str) -> AppResult<()> {
            Ok(())
        }

        async fn list(&self, _tenant_id: TenantId) -> AppResult<Vec<Robot>> {
            Ok(Vec::new())
        }

        async fn find(&self, _robot_id: RobotId) -> AppResult<Option<Robot>> {
            Ok(None)
        }

        async fn select_candidates(
            &self,
            _tenant_id: TenantId,
            _required_capabilities: &BTreeSet<Capability>,
            _exclude: &BTreeSet<RobotId>,
            _policy: SelectionPolicy,
            _count: u32,
        ) -> AppResult<Vec<Robot>> {
            Ok(Vec::new())
        }

        async fn find_stale(&self, _liveness_cutoff: DateTime<Utc>) -> AppResult<Vec<Robot>> {
            Ok(Vec::new())
        }

        async fn mark_offline(&self, _robot_id: RobotId) -> AppResult<Robot> {
            Err(AppError::Internal("unused".to_owned()))
        }

        async fn update(&self, robot: Robot) -> AppResult<Robot> {
            self.updated.lock().unwrap().push(robot.clone());
            Ok(robot)
        }
    }

    fn new_robot() -> Robot {
        let mut capabilities = BTreeSet::new();
        capabilities.insert(Capability::BrowserChromium);
        Robot::register(TenantId::new(), "robot-1", "host-1", capabilities, 2, Utc::now())
            .expect("valid robot")
    }

    fn new_claimed_job() -> PortClaimedJob {
        let job = Job::new(
            TenantId::new(),
            WorkflowVersionId::new(),
            JobPriority::Normal,
            serde_json::json!({}),
            TriggerType::Manual,
            3,
            Utc::now(),
            Utc::now(),
        )
        .expect("valid job");

        PortClaimedJob {
            job,
            lease_token: "token-1".to_owned(),
            lease_expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn skips_robot_with_no_capacity() {
        let mut robot = new_robot();
        robot.assign_job(casare_domain::JobId::new()).unwrap();
        robot.assign_job(casare_domain::JobId::new()).unwrap();

        let service = DispatcherService::new(
            Arc::new(StubQueue { to_claim: Mutex::new(Vec::new()) }),
            Arc::new(RecordingRobots { updated: Mutex::new(Vec::new()) }),
        );

        let outcomes = service.dispatch_to_robot(&robot, 60).await.unwrap();
        assert_eq!(outcomes, vec![DispatchOutcome::NoCapacity { robot_id: robot.id() }]);
    }

    #[tokio::test]
    async fn assigns_claimed_job_and_persists_robot_update() {
        let robot = new_robot();
        let robots = Arc::new(RecordingRobots { updated: Mutex::new(Vec::new()) });

        let service = DispatcherService::new(
            Arc::new(StubQueue {
                to_claim: Mutex::new(vec![new_claimed_job()]),
            }),
            robots.clone(),
        );

        let outcomes = service.dispatch_to_robot(&robot, 60).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], DispatchOutcome::Assigned { .. }));
        assert_eq!(robots.updated.lock().unwrap().len(), 1);
    }
}
