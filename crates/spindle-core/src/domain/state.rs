//! Lifecycle states for jobs and managed threads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Job state.
///
/// State transitions:
/// - Waiting -> Running -> Done
/// - Waiting -> Running -> Failed
/// - Waiting -> Cancelled (only before execution starts)
///
/// Terminal states are write-once: nothing leaves Done, Failed or Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, not yet claimed by a worker.
    Waiting,

    /// Claimed by exactly one worker and executing.
    Running,

    /// Payload returned successfully.
    Done,

    /// Payload returned an error or panicked.
    Failed,

    /// Removed from the queue before it ran.
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Waiting, JobState::Running)
                | (JobState::Waiting, JobState::Cancelled)
                | (JobState::Running, JobState::Done)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Managed thread state.
///
/// Created -> Starting -> Running -> {Suspended <-> Running} -> Stopping -> Stopped
///
/// A thread that is stopped before it was ever started goes
/// Created -> Stopping -> Stopped and never runs its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    Created,
    Starting,
    Running,
    Suspended,
    Stopping,
    Stopped,
}

impl ThreadState {
    pub fn can_transition_to(self, next: ThreadState) -> bool {
        use ThreadState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Created, Stopping)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Running, Suspended)
                | (Suspended, Running)
                | (Running, Stopping)
                | (Suspended, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// The body is alive (started and not yet told to wind down).
    pub fn is_active(self) -> bool {
        matches!(self, ThreadState::Running | ThreadState::Suspended)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreadState::Created => "created",
            ThreadState::Starting => "starting",
            ThreadState::Running => "running",
            ThreadState::Suspended => "suspended",
            ThreadState::Stopping => "stopping",
            ThreadState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
