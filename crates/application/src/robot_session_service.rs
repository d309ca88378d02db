//! Tagged message vocabulary and idempotency tracking for the live,
//! bidirectional robot session (a framed websocket connection in
//! `casare-orchestrator-api`). Grounded on the teacher's
//! `action_dispatcher.rs` message-passing shape, adapted from one-shot
//! HTTP action dispatch to a long-lived duplex stream.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use casare_domain::{Capability, JobFailureCategory, JobId, RobotId, RobotStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// The closed vocabulary of messages exchanged over a robot session.
/// Robot-to-orchestrator and orchestrator-to-robot frames share a single
/// tagged enum so both ends parse with one `serde_json` schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotFrame {
    /// Robot -> orchestrator: announces identity and capabilities, opening
    /// the session.
    Register {
        /// The registering robot's identifier.
        robot_id: RobotId,
        /// Advertised capabilities.
        capabilities: BTreeSet<Capability>,
        /// Maximum concurrent jobs the robot accepts.
        max_concurrent: u32,
    },
    /// Robot -> orchestrator: periodic liveness/progress report.
    Heartbeat {
        /// The reporting robot.
        robot_id: RobotId,
        /// The job being reported on, if any.
        job_id: Option<JobId>,
        /// Reported progress, if a job is in flight.
        progress_percent: Option<u8>,
        /// Reported current workflow node, if a job is in flight.
        current_node_id: Option<String>,
    },
    /// Robot -> orchestrator: accepts a `JobAssign` it was sent.
    JobAccept {
        /// Correlation id copied from the `JobAssign` being acknowledged.
        correlation_id: Uuid,
        /// The accepted job.
        job_id: JobId,
    },
    /// Robot -> orchestrator: rejects a `JobAssign` it was sent (e.g. it
    /// has since lost capacity).
    JobReject {
        /// Correlation id copied from the `JobAssign` being acknowledged.
        correlation_id: Uuid,
        /// The rejected job.
        job_id: JobId,
        /// The reason for rejection.
        reason: String,
    },
    /// Robot -> orchestrator: mid-execution progress update.
    JobProgress {
        /// Correlation id of the originating `JobAssign`.
        correlation_id: Uuid,
        /// The job in progress.
        job_id: JobId,
        /// Reported completion percentage.
        progress_percent: u8,
        /// Currently executing workflow node, if reported.
        current_node_id: Option<String>,
    },
    /// Robot -> orchestrator: the job finished successfully.
    JobComplete {
        /// Correlation id of the originating `JobAssign`.
        correlation_id: Uuid,
        /// The completed job.
        job_id: JobId,
        /// The job's result payload.
        result: Value,
    },
    /// Robot -> orchestrator: the job failed.
    JobFailed {
        /// Correlation id of the originating `JobAssign`.
        correlation_id: Uuid,
        /// The failed job.
        job_id: JobId,
        /// The failure message.
        error: String,
        /// The failure category, driving retry/DLQ policy.
        category: JobFailureCategory,
    },
    /// Robot -> orchestrator: acknowledges a `JobCancel`.
    JobCancelled {
        /// Correlation id of the originating `JobCancel`.
        correlation_id: Uuid,
        /// The cancelled job.
        job_id: JobId,
    },
    /// Robot -> orchestrator: a single log line emitted during execution.
    LogEntry {
        /// The job the log line belongs to.
        job_id: JobId,
        /// Log severity level, e.g. `"info"`, `"error"`.
        level: String,
        /// The log message.
        message: String,
        /// The time the line was emitted.
        timestamp: DateTime<Utc>,
    },
    /// Robot -> orchestrator: a batch of log lines, sent to amortize
    /// per-message overhead for chatty workflows.
    LogBatch {
        /// The job the log lines belong to.
        job_id: JobId,
        /// The batched log lines, oldest first.
        entries: Vec<LogLine>,
    },
    /// Robot -> orchestrator: answers a `StatusRequest`.
    StatusResponse {
        /// The responding robot.
        robot_id: RobotId,
        /// The robot's current status.
        status: RobotStatus,
        /// The robot's current job set.
        current_jobs: BTreeSet<JobId>,
    },
    /// Robot -> orchestrator: the robot is closing the session
    /// intentionally.
    Disconnect {
        /// The reason for the disconnect.
        reason: String,
    },
    /// Robot -> orchestrator: reports a protocol-level error in a prior
    /// frame.
    Error {
        /// The error message.
        message: String,
    },
    /// Orchestrator -> robot: acknowledges `Register`.
    RegisterAck {
        /// The registered robot's identifier.
        robot_id: RobotId,
    },
    /// Orchestrator -> robot: acknowledges a `Heartbeat`.
    HeartbeatAck,
    /// Orchestrator -> robot: assigns a claimed job for execution.
    JobAssign {
        /// Correlation id the robot must echo on every frame reporting on
        /// this job.
        correlation_id: Uuid,
        /// The assigned job.
        job_id: JobId,
        /// The lease token the robot must present when reporting
        /// progress, completion, or failure.
        lease_token: String,
        /// The resolved workflow payload and input variables to execute.
        payload: Value,
    },
    /// Orchestrator -> robot: cancels an in-flight or pending job.
    JobCancel {
        /// Correlation id the robot should echo in its `JobCancelled`
        /// acknowledgment.
        correlation_id: Uuid,
        /// The job to cancel.
        job_id: JobId,
        /// The reason for cancellation.
        reason: String,
    },
    /// Orchestrator -> robot: requests an out-of-band status report.
    StatusRequest,
    /// Orchestrator -> robot: requests the robot stop accepting new work
    /// without disconnecting.
    Pause,
    /// Orchestrator -> robot: lifts a prior `Pause`.
    Resume,
    /// Orchestrator -> robot: requests a graceful shutdown.
    Shutdown {
        /// Time the robot is given to finish in-flight jobs before the
        /// orchestrator forcibly reclaims them.
        grace_period_seconds: u32,
    },
}

/// A single buffered log line, as carried by `RobotFrame::LogBatch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    /// Log severity level.
    pub level: String,
    /// The log message.
    pub message: String,
    /// The time the line was emitted.
    pub timestamp: DateTime<Utc>,
}

/// Tracks, per job, the correlation ids already observed from a robot so a
/// redelivered frame (e.g. after a reconnect replays its send buffer) is
/// recognized and not applied twice. Also holds the live outbound channel
/// for every currently connected robot, so the dispatcher can route a
/// `JobAssign`/`JobCancel` frame to whichever `apps/api` websocket task is
/// holding that robot's connection.
///
/// Correlation ids are retained for the lifetime of the owning job, until
/// it reaches a terminal status; the owning `JobQueueService` caller is
/// responsible for calling `forget_job` once a job completes, fails, or is
/// cancelled. This mirrors the teacher's lease-token compare-and-swap
/// pattern, which only needs to dedupe within an active lease, not forever.
#[derive(Default)]
pub struct RobotSessionRegistry {
    seen: Mutex<HashMap<JobId, HashSet<Uuid>>>,
    connections: Mutex<HashMap<RobotId, tokio::sync::mpsc::Sender<RobotFrame>>>,
}

/// The outbound half of a connected robot's frame channel, handed to a
/// freshly opened session so it can forward orchestrator-originated frames
/// (`JobAssign`, `JobCancel`, `Pause`, ...) onto the websocket.
pub type OutboundFrames = tokio::sync::mpsc::Receiver<RobotFrame>;

impl RobotSessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Records `correlation_id` for `job_id`, returning `true` if this is
    /// the first time it has been seen (the frame should be applied) or
    /// `false` if it is a replay (the frame should be acknowledged but
    /// otherwise ignored).
    pub fn observe(&self, job_id: JobId, correlation_id: Uuid) -> bool {
        let mut seen = self.seen.lock().unwrap();
        seen.entry(job_id).or_default().insert(correlation_id)
    }

    /// Releases every correlation id tracked for `job_id`. Call once the
    /// job reaches a terminal status.
    pub fn forget_job(&self, job_id: JobId) {
        self.seen.lock().unwrap().remove(&job_id);
    }

    /// Returns the number of jobs currently tracked, for diagnostics.
    #[must_use]
    pub fn tracked_job_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Registers a newly opened session for `robot_id`, replacing any
    /// stale channel left behind by a connection that dropped without
    /// calling `disconnect` (e.g. a killed process). Returns the receiving
    /// half the caller's websocket task should poll.
    pub fn connect(&self, robot_id: RobotId, buffer: usize) -> OutboundFrames {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        self.connections.lock().unwrap().insert(robot_id, tx);
        rx
    }

    /// Routes `frame` to `robot_id`'s open session, if it has one. Returns
    /// `false` if the robot is not currently connected or its channel is
    /// full/closed.
    pub fn send_to(&self, robot_id: RobotId, frame: RobotFrame) -> bool {
        let sender = self.connections.lock().unwrap().get(&robot_id).cloned();
        match sender {
            Some(sender) => sender.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Returns `true` if `robot_id` currently has an open session.
    #[must_use]
    pub fn is_connected(&self, robot_id: RobotId) -> bool {
        self.connections.lock().unwrap().contains_key(&robot_id)
    }

    /// Removes a robot's session entry. Call when its websocket task
    /// exits, whether by graceful `disconnect` or connection drop.
    pub fn disconnect(&self, robot_id: RobotId) {
        self.connections.lock().unwrap().remove(&robot_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_new_replay_is_not() {
        let registry = RobotSessionRegistry::new();
        let job_id = JobId::new();
        let correlation_id = Uuid::new_v4();

        assert!(registry.observe(job_id, correlation_id));
        assert!(!registry.observe(job_id, correlation_id));
    }

    #[test]
    fn forgetting_a_job_clears_its_correlation_ids() {
        let registry = RobotSessionRegistry::new();
        let job_id = JobId::new();
        let correlation_id = Uuid::new_v4();

        registry.observe(job_id, correlation_id);
        registry.forget_job(job_id);
        assert!(registry.observe(job_id, correlation_id));
    }

    #[test]
    fn frames_round_trip_through_json() {
        let frame = RobotFrame::HeartbeatAck;
        let json = serde_json::to_string(&frame).expect("serializes");
        let restored: RobotFrame = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(frame, restored);
    }
}
