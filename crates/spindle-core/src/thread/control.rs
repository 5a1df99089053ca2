//! Shared control block of a managed thread.
//!
//! State, stop flag and suspension deadline live under one mutex, paired with
//! one condition variable. Every change notifies all waiters, so requests from
//! other threads are never lost even when they race with the body's own
//! transitions.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::domain::{ThreadId, ThreadState};
use crate::error::{Result, SpindleError};

pub(crate) struct Control {
    pub(crate) state: ThreadState,
    pub(crate) stop_requested: bool,
    /// Auto-resume deadline while Suspended. `None` = until `resume()`.
    pub(crate) resume_at: Option<Instant>,
    pub(crate) failure: Option<String>,
}

impl Control {
    fn new() -> Self {
        Self {
            state: ThreadState::Created,
            stop_requested: false,
            resume_at: None,
            failure: None,
        }
    }

    /// Leave Suspended once the auto-resume deadline has passed.
    fn expire_suspension(&mut self, now: Instant) -> bool {
        let due = self.state == ThreadState::Suspended
            && matches!(self.resume_at, Some(at) if at <= now);
        if due {
            self.state = ThreadState::Running;
            self.resume_at = None;
        }
        due
    }
}

pub(crate) struct Shared {
    pub(crate) id: ThreadId,
    pub(crate) name: String,
    control: Mutex<Control>,
    changed: Condvar,
}

impl Shared {
    pub(crate) fn new(id: ThreadId, name: String) -> Self {
        Self {
            id,
            name,
            control: Mutex::new(Control::new()),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock()
    }

    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }

    pub(crate) fn wait(&self, control: &mut MutexGuard<'_, Control>) {
        self.changed.wait(control);
    }

    /// Move to `next`. Callers only pass transitions the state machine allows.
    pub(crate) fn enter(&self, control: &mut Control, next: ThreadState) {
        debug_assert!(
            control.state.can_transition_to(next),
            "illegal thread transition {} -> {}",
            control.state,
            next
        );
        debug!(thread = %self.name, from = %control.state, to = %next, "thread state changed");
        control.state = next;
        self.changed.notify_all();
    }

    pub(crate) fn state(&self) -> ThreadState {
        let mut control = self.lock();
        if control.expire_suspension(Instant::now()) {
            self.changed.notify_all();
        }
        control.state
    }

    pub(crate) fn stop_requested(&self) -> bool {
        let control = self.lock();
        control.stop_requested || control.state == ThreadState::Stopping
    }

    /// Running -> Suspended, or replace the deadline of an existing suspension.
    pub(crate) fn suspend(&self, duration: Duration) -> Result<()> {
        let now = Instant::now();
        let mut control = self.lock();
        control.expire_suspension(now);
        match control.state {
            ThreadState::Running => self.enter(&mut control, ThreadState::Suspended),
            ThreadState::Suspended => {}
            other => {
                return Err(SpindleError::InvalidStateTransition {
                    from: other,
                    to: ThreadState::Suspended,
                });
            }
        }
        control.resume_at = if duration.is_zero() {
            None
        } else {
            now.checked_add(duration)
        };
        self.changed.notify_all();
        Ok(())
    }

    pub(crate) fn resume(&self) {
        let mut control = self.lock();
        if control.state == ThreadState::Suspended {
            control.resume_at = None;
            self.enter(&mut control, ThreadState::Running);
        }
    }

    pub(crate) fn request_stop(&self) {
        let mut control = self.lock();
        match control.state {
            ThreadState::Created => {
                self.enter(&mut control, ThreadState::Stopping);
                self.enter(&mut control, ThreadState::Stopped);
            }
            ThreadState::Stopping | ThreadState::Stopped => {}
            _ => {
                control.stop_requested = true;
                self.changed.notify_all();
            }
        }
    }

    /// Cooperative checkpoint used by the body.
    ///
    /// Blocks while the thread is suspended and, when `wake_at` is set, until
    /// that instant. Returns `true` as soon as a stop has been requested, after
    /// moving the thread to Stopping.
    pub(crate) fn park(&self, wake_at: Option<Instant>) -> bool {
        let mut control = self.lock();
        loop {
            if control.stop_requested || control.state == ThreadState::Stopping {
                if control.state != ThreadState::Stopping {
                    self.enter(&mut control, ThreadState::Stopping);
                }
                return true;
            }

            let now = Instant::now();
            if control.expire_suspension(now) {
                self.changed.notify_all();
            }

            if control.state == ThreadState::Suspended {
                match control.resume_at {
                    Some(at) => {
                        self.changed.wait_until(&mut control, at);
                    }
                    None => self.changed.wait(&mut control),
                }
                continue;
            }

            match wake_at {
                Some(at) if now < at => {
                    self.changed.wait_until(&mut control, at);
                }
                _ => return false,
            }
        }
    }

    /// Block until Stopped. Returns whether Stopped was reached in time.
    pub(crate) fn wait_stopped(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut control = self.lock();
        while control.state != ThreadState::Stopped {
            match deadline {
                Some(at) => {
                    if self.changed.wait_until(&mut control, at).timed_out() {
                        return control.state == ThreadState::Stopped;
                    }
                }
                None => self.changed.wait(&mut control),
            }
        }
        true
    }
}
