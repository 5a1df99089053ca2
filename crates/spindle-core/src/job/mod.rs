//! Jobs: the unit of work a queue service executes.
//!
//! A [`Job`] is built by the producer and handed to the service, which turns
//! it into a shared entry. The producer keeps a [`JobHandle`] to that entry:
//! it can observe the state and block until a terminal state is reached
//! without knowing anything about queue internals.

mod record;

pub use record::{JobRecord, JobStatus};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::domain::{JobId, JobState, Priority};
use crate::error::{BoxError, Result, SpindleError};

type Payload = Box<dyn FnOnce(&JobContext) -> std::result::Result<(), BoxError> + Send + 'static>;

/// A job that has not been submitted yet.
pub struct Job {
    name: Option<String>,
    payload: Payload,
}

impl Job {
    pub fn new<F>(payload: F) -> Self
    where
        F: FnOnce(&JobContext) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        Self {
            name: None,
            payload: Box::new(payload),
        }
    }

    /// Infallible payload that does not need the context.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move |_ctx| {
            f();
            Ok(())
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish_non_exhaustive()
    }
}

pub(crate) struct JobEntry {
    id: JobId,
    name: Option<String>,
    priority: Priority,
    /// Submission sequence within the owning service; FIFO tie-break.
    seq: u64,
    record: Mutex<JobRecord>,
    finished: Condvar,
    payload: Mutex<Option<Payload>>,
    abort: AtomicBool,
}

impl JobEntry {
    pub(crate) fn new(
        id: JobId,
        job: Job,
        priority: Priority,
        seq: u64,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: job.name,
            priority,
            seq,
            record: Mutex::new(JobRecord::new(submitted_at)),
            finished: Condvar::new(),
            payload: Mutex::new(Some(job.payload)),
            abort: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn state(&self) -> JobState {
        self.record.lock().state
    }

    /// Waiting -> Running. Exactly one caller wins.
    pub(crate) fn try_claim(&self, worker: &str, now: DateTime<Utc>) -> bool {
        let mut record = self.record.lock();
        let claimed = record.transition(JobState::Waiting, JobState::Running, now);
        if claimed {
            record.worker = Some(worker.to_string());
        }
        claimed
    }

    /// Waiting -> Cancelled. Refused once the job has been claimed.
    pub(crate) fn try_cancel(&self, now: DateTime<Utc>) -> bool {
        let mut record = self.record.lock();
        let cancelled = record.transition(JobState::Waiting, JobState::Cancelled, now);
        if cancelled {
            self.abort.store(true, Ordering::SeqCst);
            self.payload.lock().take();
            self.finished.notify_all();
        }
        cancelled
    }

    /// Running -> Done / Failed. Only the claiming worker calls this.
    pub(crate) fn finish(&self, outcome: std::result::Result<(), String>, now: DateTime<Utc>) {
        let mut record = self.record.lock();
        let next = if outcome.is_ok() {
            JobState::Done
        } else {
            JobState::Failed
        };
        if record.transition(JobState::Running, next, now) {
            record.failure = outcome.err();
        }
        self.finished.notify_all();
    }

    pub(crate) fn take_payload(&self) -> Option<Payload> {
        self.payload.lock().take()
    }

    pub(crate) fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }
}

/// Shared reference to a submitted job.
#[derive(Clone)]
pub struct JobHandle {
    entry: Arc<JobEntry>,
}

impl JobHandle {
    pub(crate) fn new(entry: Arc<JobEntry>) -> Self {
        Self { entry }
    }

    pub(crate) fn entry(&self) -> &Arc<JobEntry> {
        &self.entry
    }

    pub fn id(&self) -> JobId {
        self.entry.id
    }

    pub fn name(&self) -> Option<&str> {
        self.entry.name.as_deref()
    }

    pub fn priority(&self) -> Priority {
        self.entry.priority
    }

    pub fn state(&self) -> JobState {
        self.entry.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn failure(&self) -> Option<String> {
        self.entry.record.lock().failure.clone()
    }

    pub fn status(&self) -> JobStatus {
        let record = self.entry.record.lock().clone();
        JobStatus {
            job_id: self.entry.id,
            name: self.entry.name.clone(),
            state: record.state,
            priority: self.entry.priority,
            submitted_at: record.submitted_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            worker: record.worker,
            failure: record.failure,
        }
    }

    /// Block until the job reaches a terminal state or `timeout` elapses
    /// (`None` = forever). Returns the terminal state, if reached.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<JobState> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut record = self.entry.record.lock();
        while !record.state.is_terminal() {
            match deadline {
                Some(at) => {
                    if self.entry.finished.wait_until(&mut record, at).timed_out()
                        && !record.state.is_terminal()
                    {
                        return None;
                    }
                }
                None => self.entry.finished.wait(&mut record),
            }
        }
        Some(record.state)
    }

    /// `wait`, then map the terminal state to a result.
    pub fn result(&self, timeout: Option<Duration>) -> Result<()> {
        match self.wait(timeout) {
            Some(JobState::Done) => Ok(()),
            Some(JobState::Cancelled) => Err(SpindleError::JobCancelled(self.id())),
            Some(_) => Err(SpindleError::JobExecutionFailed {
                job: self.id(),
                reason: self.failure().unwrap_or_default(),
            }),
            None => Err(SpindleError::Timeout(timeout.unwrap_or_default())),
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.entry.id)
            .field("priority", &self.entry.priority)
            .field("state", &self.state())
            .finish()
    }
}

/// Passed to a running payload.
pub struct JobContext {
    entry: Arc<JobEntry>,
    worker: String,
}

impl JobContext {
    pub(crate) fn new(entry: Arc<JobEntry>, worker: String) -> Self {
        Self { entry, worker }
    }

    pub fn job_id(&self) -> JobId {
        self.entry.id
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Set when the service shuts down without draining. Long payloads may
    /// poll it and return early; nothing forces them to.
    pub fn should_abort(&self) -> bool {
        self.entry.abort.load(Ordering::SeqCst)
    }
}
