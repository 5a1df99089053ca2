//! Managed thread: one OS thread behind a start/suspend/resume/stop/wait
//! state machine.
//!
//! The body is a closure receiving a [`ThreadContext`]. Suspension and stop
//! are cooperative: they take effect when the body reaches a checkpoint
//! (`should_stop`, `suspend`, `sleep`). Nothing is ever killed.

mod context;
mod control;

pub use context::ThreadContext;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};

use self::control::Shared;
use crate::domain::{ThreadId, ThreadState};
use crate::error::{Result, SpindleError, panic_reason};
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};

type Body = Box<dyn FnOnce(&ThreadContext) + Send + 'static>;

pub struct ManagedThread {
    shared: Arc<Shared>,
    body: Mutex<Option<Body>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ManagedThread {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&ThreadContext) + Send + 'static,
    {
        let id = UlidGenerator::new(SystemClock).generate_thread_id();
        Self::with_id(id, name, body)
    }

    pub fn with_id<F>(id: ThreadId, name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&ThreadContext) + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared::new(id, name.into())),
            body: Mutex::new(Some(Box::new(body))),
            handle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ThreadState {
        self.shared.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ThreadState::Stopped
    }

    /// Reason the body panicked, if it did.
    pub fn failure(&self) -> Option<String> {
        self.shared.lock().failure.clone()
    }

    /// Created -> Starting -> Running.
    ///
    /// Returns once the new thread has reported Running (or, when a stop
    /// raced the start, Stopped).
    pub fn start(&self) -> Result<()> {
        let body = {
            let mut control = self.shared.lock();
            if control.state != ThreadState::Created {
                return Err(SpindleError::AlreadyStarted(control.state));
            }
            let Some(body) = self.body.lock().take() else {
                return Err(SpindleError::AlreadyStarted(control.state));
            };
            self.shared.enter(&mut control, ThreadState::Starting);
            body
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || run(shared, body));

        match spawned {
            Ok(handle) => *self.handle.lock() = Some(handle),
            Err(err) => {
                let mut control = self.shared.lock();
                control.failure = Some(err.to_string());
                self.shared.enter(&mut control, ThreadState::Stopping);
                self.shared.enter(&mut control, ThreadState::Stopped);
                return Err(SpindleError::Spawn(err));
            }
        }

        let mut control = self.shared.lock();
        while control.state == ThreadState::Starting {
            self.shared.wait(&mut control);
        }
        Ok(())
    }

    /// Running -> Suspended. `Duration::ZERO` suspends until `resume()`.
    ///
    /// Suspending an already suspended thread replaces its deadline.
    pub fn suspend(&self, duration: Duration) -> Result<()> {
        self.shared.suspend(duration)
    }

    /// Suspended -> Running. No-op in any other state.
    pub fn resume(&self) {
        self.shared.resume();
    }

    /// Request termination. The body observes it at its next checkpoint.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Block until Stopped or until `timeout` elapses (`None` = forever).
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let stopped = self.shared.wait_stopped(timeout);
        if stopped {
            self.reap();
        }
        stopped
    }

    /// `stop()` then `wait()`, reporting a missed deadline as `Timeout`.
    pub fn stop_and_wait(&self, timeout: Option<Duration>) -> Result<()> {
        self.stop();
        if self.wait(timeout) {
            Ok(())
        } else {
            Err(SpindleError::Timeout(timeout.unwrap_or_default()))
        }
    }

    fn reap(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        self.shared.request_stop();
        self.reap();
    }
}

fn run(shared: Arc<Shared>, body: Body) {
    {
        let mut control = shared.lock();
        if control.stop_requested {
            shared.enter(&mut control, ThreadState::Stopping);
            shared.enter(&mut control, ThreadState::Stopped);
            return;
        }
        shared.enter(&mut control, ThreadState::Running);
    }

    let context = ThreadContext::new(Arc::clone(&shared));
    let outcome = catch_unwind(AssertUnwindSafe(|| body(&context)));

    let mut control = shared.lock();
    if let Err(payload) = outcome {
        let reason = panic_reason(payload.as_ref());
        error!(thread = %shared.name, %reason, "thread body panicked");
        control.failure = Some(reason);
    }
    if control.state != ThreadState::Stopping {
        shared.enter(&mut control, ThreadState::Stopping);
    }
    control.resume_at = None;
    shared.enter(&mut control, ThreadState::Stopped);
    debug!(thread = %shared.name, "thread exited");
}
