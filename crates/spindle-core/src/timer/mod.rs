//! Repeating timer on its own managed thread.
//!
//! Each cycle sleeps (interruptibly), then invokes the callback. The callback
//! returns whether to keep going. An error or panic from the callback ends
//! the timer and is kept as its failure reason.
//!
//! The thread body only holds a `Weak` reference to the timer's shared
//! state; dropping the `Timer` ends the loop even if the stop request is
//! never observed.

mod config;
mod schedule;

pub use config::TimerConfig;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use self::config::interval_millis;
use crate::domain::ThreadState;
use crate::error::{BoxError, Result, SpindleError, panic_reason};
use crate::thread::{ManagedThread, ThreadContext};

type Callback = Box<dyn FnMut(Tick) -> std::result::Result<bool, BoxError> + Send + 'static>;

/// Unset marker for the `last_*` atomics.
const UNSET: u64 = u64::MAX;

/// What a callback learns about the tick it is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1 for the first tick.
    pub cycle: u64,
    /// Monotonic time since the previous tick began (or since the timer
    /// started, on the first tick).
    pub elapsed: Duration,
}

impl Tick {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

struct TimerShared {
    name: String,
    precise: bool,
    max_cycles: Option<u64>,
    interval_ms: AtomicU64,
    ticks: AtomicU64,
    last_elapsed_ms: AtomicU64,
    last_sleep_ms: AtomicU64,
    callback: Mutex<Callback>,
    failure: Mutex<Option<String>>,
}

impl TimerShared {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    fn fail(&self, reason: String) {
        warn!(timer = %self.name, %reason, "timer callback failed");
        *self.failure.lock() = Some(reason);
    }
}

pub struct Timer {
    shared: Arc<TimerShared>,
    thread: ManagedThread,
}

impl Timer {
    pub fn new<F>(config: TimerConfig, callback: F) -> Result<Self>
    where
        F: FnMut(Tick) -> std::result::Result<bool, BoxError> + Send + 'static,
    {
        config.validate()?;
        let shared = Arc::new(TimerShared {
            name: config.name.clone(),
            precise: config.precise,
            max_cycles: config.max_cycles,
            interval_ms: AtomicU64::new(config.interval_ms),
            ticks: AtomicU64::new(0),
            last_elapsed_ms: AtomicU64::new(UNSET),
            last_sleep_ms: AtomicU64::new(UNSET),
            callback: Mutex::new(Box::new(callback)),
            failure: Mutex::new(None),
        });

        let weak = Arc::downgrade(&shared);
        let thread = ManagedThread::new(config.name.clone(), move |ctx| tick_loop(&weak, ctx));
        let timer = Self { shared, thread };
        if config.autostart {
            timer.start()?;
        }
        Ok(timer)
    }

    /// Non-precise timer: the callback runs `interval` after the previous
    /// one returned.
    pub fn every<F>(interval: Duration, mut callback: F) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Self::new(TimerConfig::new(interval), move |_tick| Ok(callback()))
    }

    /// Precise timer: the callback receives the milliseconds elapsed since
    /// the previous tick began.
    pub fn every_precise<F>(interval: Duration, mut callback: F) -> Result<Self>
    where
        F: FnMut(u64) -> bool + Send + 'static,
    {
        let config = TimerConfig::new(interval).with_precise(true);
        Self::new(config, move |tick| Ok(callback(tick.elapsed_ms())))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_precise(&self) -> bool {
        self.shared.precise
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval()
    }

    /// Change the interval. Takes effect from the next sleep on.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        let interval_ms = interval_millis(interval)?;
        self.shared.interval_ms.store(interval_ms, Ordering::SeqCst);
        debug!(timer = %self.shared.name, interval_ms, "timer interval changed");
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        self.thread.start()
    }

    pub fn stop(&self) {
        self.thread.stop();
    }

    pub fn suspend(&self, duration: Duration) -> Result<()> {
        self.thread.suspend(duration)
    }

    pub fn resume(&self) {
        self.thread.resume();
    }

    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.thread.wait(timeout)
    }

    pub fn stop_and_wait(&self, timeout: Option<Duration>) -> Result<()> {
        self.thread.stop_and_wait(timeout)
    }

    pub fn state(&self) -> ThreadState {
        self.thread.state()
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// Elapsed milliseconds reported to the most recent tick.
    pub fn last_elapsed_ms(&self) -> Option<u64> {
        match self.shared.last_elapsed_ms.load(Ordering::SeqCst) {
            UNSET => None,
            ms => Some(ms),
        }
    }

    /// Most recently scheduled sleep between two ticks.
    pub fn last_sleep(&self) -> Option<Duration> {
        match self.shared.last_sleep_ms.load(Ordering::SeqCst) {
            UNSET => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn failure(&self) -> Option<String> {
        self.shared.failure.lock().clone()
    }

    /// `TimerCallbackFailed` if the callback ended the timer with an error
    /// or a panic.
    pub fn result(&self) -> Result<()> {
        match self.failure() {
            Some(reason) => Err(SpindleError::TimerCallbackFailed { reason }),
            None => Ok(()),
        }
    }
}

/// Milliseconds for the `last_*` atomics, kept clear of `UNSET`.
fn stored_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).map_or(UNSET - 1, |ms| ms.min(UNSET - 1))
}

fn tick_loop(weak: &Weak<TimerShared>, ctx: &ThreadContext) {
    let mut previous = Instant::now();
    let mut sleep = match weak.upgrade() {
        Some(shared) => shared.interval(),
        None => return,
    };

    loop {
        if ctx.sleep(sleep) {
            break;
        }
        let Some(shared) = weak.upgrade() else {
            break;
        };

        let started = Instant::now();
        let tick = Tick {
            cycle: shared.ticks.load(Ordering::SeqCst) + 1,
            elapsed: started.duration_since(previous),
        };
        previous = started;
        shared
            .last_elapsed_ms
            .store(stored_millis(tick.elapsed), Ordering::SeqCst);

        let outcome = {
            let mut callback = shared.callback.lock();
            catch_unwind(AssertUnwindSafe(|| (&mut **callback)(tick)))
        };
        shared.ticks.store(tick.cycle, Ordering::SeqCst);

        match outcome {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                debug!(timer = %shared.name, cycle = tick.cycle, "timer callback asked to stop");
                break;
            }
            Ok(Err(err)) => {
                shared.fail(err.to_string());
                break;
            }
            Err(panic) => {
                shared.fail(panic_reason(panic.as_ref()));
                break;
            }
        }

        if shared.max_cycles.is_some_and(|max| tick.cycle >= max) {
            debug!(timer = %shared.name, cycles = tick.cycle, "timer reached its cycle limit");
            break;
        }

        sleep = schedule::next_sleep(shared.interval(), started.elapsed(), shared.precise);
        shared
            .last_sleep_ms
            .store(stored_millis(sleep), Ordering::SeqCst);
    }
}
