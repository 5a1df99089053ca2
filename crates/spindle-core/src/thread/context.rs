use std::sync::Arc;
use std::time::{Duration, Instant};

use super::control::Shared;
use crate::domain::ThreadId;

/// Handle given to a thread body for its cooperative checkpoints.
///
/// Each checkpoint returns `true` when the body should return because a stop
/// was requested.
pub struct ThreadContext {
    shared: Arc<Shared>,
}

impl ThreadContext {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> ThreadId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Non-blocking peek at the stop flag.
    pub fn stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }

    /// Checkpoint: honours a pending suspension, then reports the stop flag.
    pub fn should_stop(&self) -> bool {
        self.shared.park(None)
    }

    /// Suspend this thread from inside its body.
    ///
    /// `Duration::ZERO` blocks until `resume()` or `stop()`; otherwise the
    /// thread resumes by itself once `duration` has elapsed.
    pub fn suspend(&self, duration: Duration) -> bool {
        if self.shared.suspend(duration).is_err() {
            return self.stop_requested();
        }
        self.shared.park(None)
    }

    /// Sleep for `duration` without leaving Running. A stop wakes it at once.
    pub fn sleep(&self, duration: Duration) -> bool {
        match Instant::now().checked_add(duration) {
            Some(deadline) => self.sleep_until(deadline),
            // beyond what the clock can represent: only a stop ends it
            None => loop {
                if self.sleep(Duration::from_secs(86_400)) {
                    return true;
                }
            },
        }
    }

    pub fn sleep_until(&self, deadline: Instant) -> bool {
        self.shared.park(Some(deadline))
    }
}
