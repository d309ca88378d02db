use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::robot::RobotId;
use crate::schedule::ScheduleId;

/// A single recorded execution of a schedule's fire, feeding SLA
/// computation and catch-up accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHistoryRecord {
    schedule_id: ScheduleId,
    scheduled_time: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    success: Option<bool>,
    error_message: Option<String>,
    robot_id: Option<RobotId>,
    job_id: Option<JobId>,
    catch_up: bool,
}

impl ExecutionHistoryRecord {
    /// Creates a new, not-yet-started history record for a fire.
    #[must_use]
    pub fn new(schedule_id: ScheduleId, scheduled_time: DateTime<Utc>, catch_up: bool) -> Self {
        Self {
            schedule_id,
            scheduled_time,
            started_at: None,
            completed_at: None,
            success: None,
            error_message: None,
            robot_id: None,
            job_id: None,
            catch_up,
        }
    }

    /// Reconstructs a history record from persisted fields without
    /// re-running the fresh-record defaults (used by repository `FromRow`
    /// mappings).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        schedule_id: ScheduleId,
        scheduled_time: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        success: Option<bool>,
        error_message: Option<String>,
        robot_id: Option<RobotId>,
        job_id: Option<JobId>,
        catch_up: bool,
    ) -> Self {
        Self {
            schedule_id,
            scheduled_time,
            started_at,
            completed_at,
            success,
            error_message,
            robot_id,
            job_id,
            catch_up,
        }
    }

    /// Returns the time the associated job started executing, if it has.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns the time the associated job reached a terminal state, if it
    /// has.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the terminal error message, if the run failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the robot that executed this fire, if one has claimed it.
    #[must_use]
    pub fn robot_id(&self) -> Option<RobotId> {
        self.robot_id
    }

    /// Returns the job enqueued for this fire, if one has been created.
    #[must_use]
    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    /// Returns the schedule this record belongs to.
    #[must_use]
    pub fn schedule_id(&self) -> ScheduleId {
        self.schedule_id
    }

    /// Returns the fire's originally scheduled time.
    #[must_use]
    pub fn scheduled_time(&self) -> DateTime<Utc> {
        self.scheduled_time
    }

    /// Returns whether this record represents a catch-up replay rather
    /// than an on-time fire.
    #[must_use]
    pub fn is_catch_up(&self) -> bool {
        self.catch_up
    }

    /// Returns the delay between `scheduled_time` and actual start, if the
    /// record has started.
    #[must_use]
    pub fn start_delay(&self) -> Option<chrono::Duration> {
        self.started_at.map(|started| started - self.scheduled_time)
    }

    /// Returns the execution duration, if the record has completed.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }

    /// Records that the associated job started executing.
    pub fn record_start(&mut self, robot_id: RobotId, job_id: JobId, started_at: DateTime<Utc>) {
        self.robot_id = Some(robot_id);
        self.job_id = Some(job_id);
        self.started_at = Some(started_at);
    }

    /// Records the terminal outcome of the associated job.
    pub fn record_completion(
        &mut self,
        success: bool,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) {
        self.success = Some(success);
        self.error_message = error_message;
        self.completed_at = Some(completed_at);
    }

    /// Returns whether the run succeeded, if it has completed.
    #[must_use]
    pub fn success(&self) -> Option<bool> {
        self.success
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionHistoryRecord;
    use crate::{job::JobId, robot::RobotId, schedule::ScheduleId};
    use chrono::Utc;

    #[test]
    fn duration_is_none_until_completed() {
        let mut record = ExecutionHistoryRecord::new(ScheduleId::new(), Utc::now(), false);
        assert!(record.duration().is_none());
        record.record_start(RobotId::new(), JobId::new(), Utc::now());
        assert!(record.duration().is_none());
        record.record_completion(true, None, Utc::now());
        assert!(record.duration().is_some());
    }
}
