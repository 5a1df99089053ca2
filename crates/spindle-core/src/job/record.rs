//! Job record: lifecycle state plus the metadata observers read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{JobId, JobState, Priority};

/// Mutable part of a job, guarded by the job's lock.
///
/// All state transitions go through `transition`, which refuses anything
/// the job state machine does not allow. This is what keeps terminal states
/// write-once.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Name of the worker thread that claimed the job.
    pub worker: Option<String>,
    pub failure: Option<String>,
}

impl JobRecord {
    pub fn new(submitted_at: DateTime<Utc>) -> Self {
        Self {
            state: JobState::Waiting,
            submitted_at,
            started_at: None,
            finished_at: None,
            worker: None,
            failure: None,
        }
    }

    /// Compare-and-swap on the state: only moves when the current state is
    /// `from` and the state machine allows `from -> to`.
    pub fn transition(&mut self, from: JobState, to: JobState, now: DateTime<Utc>) -> bool {
        if self.state != from || !from.can_transition_to(to) {
            return false;
        }
        self.state = to;
        match to {
            JobState::Running => self.started_at = Some(now),
            JobState::Done | JobState::Failed | JobState::Cancelled => self.finished_at = Some(now),
            JobState::Waiting => {}
        }
        true
    }
}

/// Serializable snapshot of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub name: Option<String>,
    pub state: JobState,
    pub priority: Priority,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker: Option<String>,
    pub failure: Option<String>,
}
