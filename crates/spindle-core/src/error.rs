use std::time::Duration;

use thiserror::Error;

use crate::domain::{JobId, ThreadState};

pub type Result<T> = std::result::Result<T, SpindleError>;

/// Boxed error returned by job payloads and timer callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SpindleError {
    #[error("queue service is not running")]
    ServiceNotRunning,

    #[error("thread already started (state={0})")]
    AlreadyStarted(ThreadState),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: ThreadState, to: ThreadState },

    #[error("job {job} failed: {reason}")]
    JobExecutionFailed { job: JobId, reason: String },

    #[error("job {0} was cancelled")]
    JobCancelled(JobId),

    #[error("timer callback failed: {reason}")]
    TimerCallbackFailed { reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Render a panic payload captured by `catch_unwind` as a failure reason.
pub(crate) fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
