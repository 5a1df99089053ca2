//! Queue service: a prioritized job queue drained by a pool of managed
//! worker threads.
//!
//! The ready queue, the running set and the counters live under one mutex
//! (`ServiceShared::state`). Two condition variables hang off it: `work`
//! wakes workers (new job, status change) and `idle` wakes `wait_idle`
//! callers. Jobs are claimed under that mutex, so a job is handed to at most
//! one worker.

mod config;
mod ready;
mod worker;

pub use config::QueueServiceConfig;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use self::ready::ReadyQueue;
use crate::domain::{JobId, Priority};
use crate::error::{Result, SpindleError};
use crate::job::{Job, JobEntry, JobHandle};
use crate::observability::QueueCounts;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
use crate::thread::ManagedThread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Created, never started. Submissions are held.
    Idle,
    Running,
    /// Workers alive, dispatch paused.
    Paused,
    Stopping,
    Stopped,
}

pub(crate) struct QueueState {
    status: ServiceStatus,
    /// Whether a stop in progress lets workers finish the backlog.
    drain: bool,
    ready: ReadyQueue,
    running: HashMap<JobId, Arc<JobEntry>>,
    next_seq: u64,
    /// Workers spawned (or reserved for spawning) and not yet exited.
    live_workers: usize,
    idle_workers: usize,
    next_worker: usize,
    done: u64,
    failed: u64,
    cancelled: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            status: ServiceStatus::Idle,
            drain: false,
            ready: ReadyQueue::default(),
            running: HashMap::new(),
            next_seq: 0,
            live_workers: 0,
            idle_workers: 0,
            next_worker: 0,
            done: 0,
            failed: 0,
            cancelled: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.running.is_empty()
    }
}

pub(crate) struct ServiceShared {
    config: QueueServiceConfig,
    min_workers: usize,
    max_workers: usize,
    state: Mutex<QueueState>,
    work: Condvar,
    idle: Condvar,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl ServiceShared {
    /// Cancel every queued job. Returns how many were cancelled.
    fn discard_waiting(&self, state: &mut MutexGuard<'_, QueueState>) -> usize {
        let now = self.clock.now();
        let cancelled = state
            .ready
            .drain()
            .into_iter()
            .filter(|job| job.try_cancel(now))
            .count();
        state.cancelled += cancelled as u64;
        if state.is_idle() {
            self.idle.notify_all();
        }
        cancelled
    }
}

pub struct QueueService {
    shared: Arc<ServiceShared>,
    /// Worker threads. Also serializes start / stop / grow.
    workers: Mutex<Vec<ManagedThread>>,
}

impl QueueService {
    pub fn new(config: QueueServiceConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids = Arc::new(UlidGenerator::new(SystemClock));
        Self::with_ports(config, clock, ids)
    }

    pub fn with_ports(
        config: QueueServiceConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self> {
        config.validate()?;
        let shared = ServiceShared {
            min_workers: config.resolved_min_workers(),
            max_workers: config.resolved_max_workers(),
            config,
            state: Mutex::new(QueueState::new()),
            work: Condvar::new(),
            idle: Condvar::new(),
            clock,
            ids,
        };
        Ok(Self {
            shared: Arc::new(shared),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &QueueServiceConfig {
        &self.shared.config
    }

    pub fn status(&self) -> ServiceStatus {
        self.shared.state.lock().status
    }

    /// Spawn the minimum worker count and begin dispatching.
    ///
    /// No-op when already Running or Paused. A Stopped service starts again
    /// with a fresh pool.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        self.launch(&mut workers)
    }

    fn launch(&self, workers: &mut Vec<ManagedThread>) -> Result<()> {
        let spawn = {
            let mut state = self.shared.state.lock();
            match state.status {
                ServiceStatus::Running | ServiceStatus::Paused => return Ok(()),
                ServiceStatus::Stopping => return Err(SpindleError::ServiceNotRunning),
                ServiceStatus::Idle | ServiceStatus::Stopped => {}
            }
            state.status = ServiceStatus::Running;
            state.drain = false;
            let spawn = self.shared.min_workers.saturating_sub(state.live_workers);
            state.live_workers += spawn;
            // jobs held before start
            self.shared.work.notify_all();
            spawn
        };

        workers.retain(|worker| !worker.is_stopped());
        for spawned in 0..spawn {
            match self.spawn_worker() {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    self.shared.state.lock().live_workers -= spawn - spawned;
                    return Err(err);
                }
            }
        }
        info!(workers = workers.len(), max_workers = self.shared.max_workers, "queue service started");
        Ok(())
    }

    fn spawn_worker(&self) -> Result<ManagedThread> {
        let index = {
            let mut state = self.shared.state.lock();
            state.next_worker += 1;
            state.next_worker - 1
        };
        let name = format!("{}-{index}", self.shared.config.thread_name_prefix);
        let shared = Arc::clone(&self.shared);
        let worker = ManagedThread::with_id(self.shared.ids.generate_thread_id(), name, move |ctx| {
            worker::worker_loop(&shared, ctx)
        });
        worker.start()?;
        Ok(worker)
    }

    /// Enqueue a job. Refused with `ServiceNotRunning` once shutdown began.
    pub fn submit(&self, job: Job, priority: impl Into<Priority>) -> Result<JobHandle> {
        let priority = priority.into();
        let id = self.shared.ids.generate_job_id();
        let (entry, grow) = {
            let mut state = self.shared.state.lock();
            if matches!(state.status, ServiceStatus::Stopping | ServiceStatus::Stopped) {
                return Err(SpindleError::ServiceNotRunning);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            let entry = Arc::new(JobEntry::new(id, job, priority, seq, self.shared.clock.now()));
            state.ready.push(Arc::clone(&entry));
            self.shared.work.notify_one();

            // 全員ビジーでキューが閾値を超えたら一人増やす (枠はロック内で予約)
            let grow = state.status == ServiceStatus::Running
                && state.idle_workers == 0
                && state.live_workers < self.shared.max_workers
                && state.ready.len() > self.shared.config.scale_up_threshold;
            if grow {
                state.live_workers += 1;
            }
            (entry, grow)
        };
        debug!(job = %id, %priority, "job submitted");

        if grow {
            self.grow();
        }
        Ok(JobHandle::new(entry))
    }

    /// Spawn one extra worker for a slot already reserved in `live_workers`.
    fn grow(&self) {
        let release = || self.shared.state.lock().live_workers -= 1;

        // start/stop hold this lock for long; skip growing rather than block submit
        let Some(mut workers) = self.workers.try_lock() else {
            release();
            return;
        };
        if self.status() != ServiceStatus::Running {
            release();
            return;
        }
        workers.retain(|worker| !worker.is_stopped());
        match self.spawn_worker() {
            Ok(worker) => {
                debug!(worker = worker.name(), "worker added under load");
                workers.push(worker);
            }
            Err(err) => {
                warn!(error = %err, "failed to add worker");
                release();
            }
        }
    }

    /// Cancel a job that has not started. Returns whether it was cancelled;
    /// running and finished jobs are left alone.
    pub fn cancel(&self, handle: &JobHandle) -> bool {
        let mut state = self.shared.state.lock();
        if !state.ready.remove(handle.id()) {
            return false;
        }
        let cancelled = handle.entry().try_cancel(self.shared.clock.now());
        if cancelled {
            state.cancelled += 1;
            debug!(job = %handle.id(), "job cancelled");
        }
        if state.is_idle() {
            self.shared.idle.notify_all();
        }
        cancelled
    }

    /// Cancel every waiting job without stopping the service.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.state.lock();
        let cancelled = self.shared.discard_waiting(&mut state);
        if cancelled > 0 {
            debug!(cancelled, "queue cleared");
        }
        cancelled
    }

    /// Pause dispatch. Running jobs finish; queued jobs wait for `resume`.
    pub fn suspend(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match state.status {
            ServiceStatus::Running => {
                state.status = ServiceStatus::Paused;
                debug!("queue service paused");
                Ok(())
            }
            ServiceStatus::Paused => Ok(()),
            _ => Err(SpindleError::ServiceNotRunning),
        }
    }

    /// Resume dispatch after `suspend`. No-op in any other status.
    pub fn resume(&self) {
        let mut state = self.shared.state.lock();
        if state.status == ServiceStatus::Paused {
            state.status = ServiceStatus::Running;
            self.shared.work.notify_all();
            debug!("queue service resumed");
        }
    }

    /// Stop the service and join every worker.
    ///
    /// Workers finish the job they are running. With `drain_pending` they
    /// also work off the whole queue first; without it every queued job is
    /// cancelled and running jobs see `JobContext::should_abort`.
    ///
    /// Exceeding the configured shutdown timeout returns `Timeout` and leaves
    /// the service Stopping; calling `stop` again keeps waiting.
    pub fn stop(&self, drain_pending: bool) -> Result<()> {
        let mut workers = self.workers.lock();

        if drain_pending {
            let held = {
                let state = self.shared.state.lock();
                state.status == ServiceStatus::Idle && !state.ready.is_empty()
            };
            if held {
                self.launch(&mut workers)?;
            }
        }

        {
            let mut state = self.shared.state.lock();
            match state.status {
                ServiceStatus::Stopped => return Ok(()),
                ServiceStatus::Idle => {
                    let cancelled = self.shared.discard_waiting(&mut state);
                    state.status = ServiceStatus::Stopped;
                    info!(cancelled, "queue service stopped before start");
                    return Ok(());
                }
                ServiceStatus::Running | ServiceStatus::Paused => {
                    state.status = ServiceStatus::Stopping;
                    state.drain = drain_pending;
                }
                ServiceStatus::Stopping => {
                    // a second stop may only tighten the first one
                    state.drain &= drain_pending;
                }
            }

            if !state.drain {
                let cancelled = self.shared.discard_waiting(&mut state);
                for job in state.running.values() {
                    job.request_abort();
                }
                debug!(cancelled, running = state.running.len(), "discarding queue");
            }
            self.shared.work.notify_all();
            self.shared.idle.notify_all();
        }

        let grace = self.shared.config.shutdown_timeout();
        let deadline = grace.and_then(|t| Instant::now().checked_add(t));
        for worker in workers.iter() {
            let remaining = deadline.map(|at| at.saturating_duration_since(Instant::now()));
            if !worker.wait(remaining) {
                warn!(worker = worker.name(), "worker did not stop within the shutdown timeout");
                return Err(SpindleError::Timeout(grace.unwrap_or_default()));
            }
        }
        workers.clear();

        let mut state = self.shared.state.lock();
        state.status = ServiceStatus::Stopped;
        info!(done = state.done, failed = state.failed, cancelled = state.cancelled, "queue service stopped");
        Ok(())
    }

    /// Block until nothing is queued or running, or until `timeout` elapses
    /// (`None` = forever). Returns whether the service went idle.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            match deadline {
                Some(at) => {
                    if self.shared.idle.wait_until(&mut state, at).timed_out() {
                        return state.is_idle();
                    }
                }
                None => self.shared.idle.wait(&mut state),
            }
        }
        true
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.shared.state.lock();
        QueueCounts {
            waiting: state.ready.len(),
            running: state.running.len(),
            done: state.done,
            failed: state.failed,
            cancelled: state.cancelled,
            workers: state.live_workers,
            idle_workers: state.idle_workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().live_workers
    }
}

impl Drop for QueueService {
    fn drop(&mut self) {
        if let Err(err) = self.stop(false) {
            warn!(error = %err, "queue service did not stop cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const LONG: Option<Duration> = Some(Duration::from_secs(10));

    fn service(config: QueueServiceConfig) -> QueueService {
        QueueService::new(config).unwrap()
    }

    /// Job blocking until the gate opens.
    fn gated(gate: &Arc<AtomicBool>) -> Job {
        let gate = Arc::clone(gate);
        Job::from_fn(move || {
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
    }

    fn recording(log: &Arc<Mutex<Vec<i32>>>, tag: i32) -> Job {
        let log = Arc::clone(log);
        Job::from_fn(move || log.lock().push(tag))
    }

    fn wait_for_state(handle: &JobHandle, state: JobState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.state() != state {
            assert!(Instant::now() < deadline, "job never reached {state}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn fail(msg: &str) {
        panic!("{msg}");
    }

    #[test]
    fn higher_priority_claimed_first() {
        let queue = service(QueueServiceConfig::fixed(1));
        let log = Arc::new(Mutex::new(Vec::new()));
        for priority in [Priority::LOW, Priority::NORMAL, Priority::HIGH] {
            queue.submit(recording(&log, priority.value()), priority).unwrap();
        }

        queue.start().unwrap();
        assert!(queue.wait_idle(LONG));
        assert_eq!(*log.lock(), vec![10, 0, -10]);
    }

    #[test]
    fn late_high_priority_job_overtakes_the_backlog() {
        let queue = service(QueueServiceConfig::fixed(1));
        queue.start().unwrap();

        let gate = Arc::new(AtomicBool::new(false));
        let blocker = queue.submit(gated(&gate), Priority::NORMAL).unwrap();
        wait_for_state(&blocker, JobState::Running);

        let log = Arc::new(Mutex::new(Vec::new()));
        queue.submit(recording(&log, 1), 1).unwrap();
        queue.submit(recording(&log, 2), 1).unwrap();
        queue.submit(recording(&log, 99), 99).unwrap();
        gate.store(true, Ordering::SeqCst);

        assert!(queue.wait_idle(LONG));
        assert_eq!(*log.lock(), vec![99, 1, 2]);
    }

    #[test]
    fn equal_priority_runs_in_submission_order() {
        let queue = service(QueueServiceConfig::fixed(1));
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..20 {
            queue.submit(recording(&log, tag), Priority::NORMAL).unwrap();
        }
        queue.start().unwrap();
        assert!(queue.wait_idle(LONG));
        assert_eq!(*log.lock(), (0..20).collect::<Vec<_>>());
    }

    fn max_concurrency(workers: usize, jobs: usize) -> usize {
        let queue = service(QueueServiceConfig::fixed(workers));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..jobs)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                let job = Job::from_fn(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
                queue.submit(job, Priority::NORMAL).unwrap()
            })
            .collect();

        queue.start().unwrap();
        for handle in &handles {
            assert_eq!(handle.wait(LONG), Some(JobState::Done));
        }
        peak.load(Ordering::SeqCst)
    }

    #[test]
    fn one_worker_is_strictly_serial() {
        assert_eq!(max_concurrency(1, 10), 1);
    }

    #[test]
    fn k_workers_run_at_most_k_jobs() {
        let peak = max_concurrency(3, 30);
        assert!((1..=3).contains(&peak), "peak {peak}");
    }

    #[test]
    fn no_job_runs_twice() {
        let queue = service(QueueServiceConfig::fixed(4));
        queue.start().unwrap();
        let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..200).map(|_| AtomicUsize::new(0)).collect());
        for i in 0..200 {
            let runs = Arc::clone(&runs);
            queue
                .submit(Job::from_fn(move || {
                    runs[i].fetch_add(1, Ordering::SeqCst);
                }), i as i32 % 3)
                .unwrap();
        }
        assert!(queue.wait_idle(LONG));
        assert!(runs.iter().all(|count| count.load(Ordering::SeqCst) == 1));
        assert_eq!(queue.counts().done, 200);
    }

    #[test]
    fn stop_without_drain_cancels_the_backlog() {
        let queue = service(QueueServiceConfig::fixed(2));
        queue.start().unwrap();
        queue.suspend().unwrap();
        let handles: Vec<_> = (0..5)
            .map(|_| queue.submit(Job::from_fn(|| {}), Priority::NORMAL).unwrap())
            .collect();

        queue.stop(false).unwrap();
        assert_eq!(queue.status(), ServiceStatus::Stopped);
        assert_eq!(queue.worker_count(), 0);
        for handle in &handles {
            assert_eq!(handle.state(), JobState::Cancelled);
        }
        assert_eq!(queue.counts().cancelled, 5);
    }

    #[test]
    fn stop_before_start_cancels_held_jobs() {
        let queue = service(QueueServiceConfig::fixed(2));
        let handles: Vec<_> = (0..5)
            .map(|_| queue.submit(Job::from_fn(|| {}), Priority::NORMAL).unwrap())
            .collect();

        queue.stop(false).unwrap();
        assert!(handles.iter().all(|h| h.state() == JobState::Cancelled));
        assert_eq!(queue.status(), ServiceStatus::Stopped);
    }

    #[test]
    fn stop_with_drain_finishes_the_backlog() {
        let queue = service(QueueServiceConfig::fixed(2));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                queue
                    .submit(Job::from_fn(|| std::thread::sleep(Duration::from_millis(2))), 0)
                    .unwrap()
            })
            .collect();

        // held jobs get workers even though start was never called
        queue.stop(true).unwrap();
        assert!(handles.iter().all(|h| h.state() == JobState::Done));
        assert_eq!(queue.counts().done, 10);
    }

    #[test]
    fn stop_without_drain_raises_the_abort_flag() {
        let queue = service(QueueServiceConfig::fixed(1));
        queue.start().unwrap();
        let running = queue
            .submit(
                Job::new(|ctx| {
                    while !ctx.should_abort() {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Ok(())
                }),
                Priority::NORMAL,
            )
            .unwrap();
        let queued = queue.submit(Job::from_fn(|| {}), Priority::NORMAL).unwrap();
        wait_for_state(&running, JobState::Running);

        queue.stop(false).unwrap();
        assert_eq!(running.state(), JobState::Done);
        assert_eq!(queued.state(), JobState::Cancelled);
    }

    #[test]
    fn stop_is_idempotent_and_refuses_new_jobs() {
        let queue = service(QueueServiceConfig::fixed(1));
        queue.start().unwrap();
        queue.stop(true).unwrap();
        queue.stop(false).unwrap();

        let err = queue.submit(Job::from_fn(|| {}), 0).unwrap_err();
        assert!(matches!(err, SpindleError::ServiceNotRunning));
    }

    #[test]
    fn stopped_service_can_start_again() {
        let queue = service(QueueServiceConfig::fixed(2));
        queue.start().unwrap();
        queue.stop(true).unwrap();

        queue.start().unwrap();
        assert_eq!(queue.worker_count(), 2);
        let handle = queue.submit(Job::from_fn(|| {}), 0).unwrap();
        assert!(handle.result(LONG).is_ok());
    }

    #[test]
    fn start_is_idempotent() {
        let queue = service(QueueServiceConfig::fixed(2));
        queue.start().unwrap();
        queue.start().unwrap();
        assert_eq!(queue.worker_count(), 2);
        assert_eq!(queue.status(), ServiceStatus::Running);
    }

    #[test]
    fn failures_are_captured_and_the_worker_keeps_going() {
        let queue = service(QueueServiceConfig::fixed(1));
        queue.start().unwrap();

        let erroring = queue.submit(Job::new(|_ctx| Err("disk full".into())), 0).unwrap();
        let panicking = queue.submit(Job::from_fn(|| fail("oops")), 0).unwrap();
        let fine = queue.submit(Job::from_fn(|| {}), 0).unwrap();

        assert_eq!(fine.wait(LONG), Some(JobState::Done));
        assert_eq!(erroring.state(), JobState::Failed);
        assert_eq!(erroring.failure().as_deref(), Some("disk full"));
        assert_eq!(panicking.state(), JobState::Failed);
        assert_eq!(panicking.failure().as_deref(), Some("panicked: oops"));
        assert!(matches!(
            panicking.result(None),
            Err(SpindleError::JobExecutionFailed { .. })
        ));

        let counts = queue.counts();
        assert_eq!((counts.done, counts.failed), (1, 2));
        assert_eq!(queue.worker_count(), 1);
    }

    #[test]
    fn counts_agree_with_a_finished_handle() {
        let queue = service(QueueServiceConfig::fixed(2));
        queue.start().unwrap();
        for round in 1..=50u64 {
            let handle = queue.submit(Job::from_fn(|| {}), 0).unwrap();
            assert_eq!(handle.wait(LONG), Some(JobState::Done));
            assert!(handle.is_finished());

            let counts = queue.counts();
            assert_eq!(counts.running, 0, "round {round}");
            assert_eq!(counts.done, round);
            assert!(counts.is_idle());
        }
    }

    #[test]
    fn cancel_only_touches_waiting_jobs() {
        let queue = service(QueueServiceConfig::fixed(1));
        queue.start().unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let running = queue.submit(gated(&gate), 0).unwrap();
        wait_for_state(&running, JobState::Running);
        let waiting = queue.submit(Job::from_fn(|| {}), 0).unwrap();

        assert!(queue.cancel(&waiting));
        assert!(!queue.cancel(&waiting));
        assert!(!queue.cancel(&running));
        assert!(matches!(waiting.result(None), Err(SpindleError::JobCancelled(_))));

        gate.store(true, Ordering::SeqCst);
        assert_eq!(running.wait(LONG), Some(JobState::Done));
        assert!(!queue.cancel(&running));

        let counts = queue.counts();
        assert_eq!((counts.done, counts.cancelled), (1, 1));
    }

    #[test]
    fn cancel_ignores_foreign_handles() {
        let a = service(QueueServiceConfig::fixed(1));
        let b = service(QueueServiceConfig::fixed(1));
        let handle = a.submit(Job::from_fn(|| {}), 0).unwrap();
        assert!(!b.cancel(&handle));
        assert_eq!(handle.state(), JobState::Waiting);
    }

    #[test]
    fn clear_cancels_everything_waiting() {
        let queue = service(QueueServiceConfig::fixed(1));
        let handles: Vec<_> = (0..3)
            .map(|_| queue.submit(Job::from_fn(|| {}), 0).unwrap())
            .collect();

        assert_eq!(queue.clear(), 3);
        assert_eq!(queue.clear(), 0);
        assert!(handles.iter().all(|h| h.state() == JobState::Cancelled));
        assert!(queue.wait_idle(Some(Duration::ZERO)));
    }

    #[test]
    fn suspend_holds_dispatch_until_resume() {
        let queue = service(QueueServiceConfig::fixed(1));
        assert!(matches!(queue.suspend(), Err(SpindleError::ServiceNotRunning)));

        queue.start().unwrap();
        queue.suspend().unwrap();
        assert_eq!(queue.status(), ServiceStatus::Paused);
        let handle = queue.submit(Job::from_fn(|| {}), 0).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.state(), JobState::Waiting);

        queue.resume();
        assert_eq!(handle.wait(LONG), Some(JobState::Done));
    }

    #[test]
    fn wait_idle_times_out_while_busy() {
        let queue = service(QueueServiceConfig::fixed(1));
        queue.start().unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let busy = queue.submit(gated(&gate), 0).unwrap();

        assert!(!queue.wait_idle(Some(Duration::from_millis(30))));
        assert!(!queue.counts().is_idle());
        assert!(!busy.is_finished());
        gate.store(true, Ordering::SeqCst);
        assert!(queue.wait_idle(LONG));
    }

    #[test]
    fn shutdown_timeout_is_reported_and_stop_can_be_retried() {
        let config = QueueServiceConfig::fixed(1).with_shutdown_timeout(Duration::from_millis(20));
        let queue = service(config);
        queue.start().unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let slow = queue.submit(gated(&gate), 0).unwrap();
        wait_for_state(&slow, JobState::Running);

        assert!(matches!(queue.stop(true), Err(SpindleError::Timeout(_))));
        assert_eq!(queue.status(), ServiceStatus::Stopping);
        assert!(matches!(queue.start(), Err(SpindleError::ServiceNotRunning)));

        gate.store(true, Ordering::SeqCst);
        assert_eq!(slow.wait(LONG), Some(JobState::Done));
        queue.stop(true).unwrap();
        assert_eq!(queue.status(), ServiceStatus::Stopped);
    }

    #[test]
    fn invalid_configuration_is_rejected_at_construction() {
        let err = QueueService::new(QueueServiceConfig::bounded(4, 2)).err().unwrap();
        assert!(matches!(err, SpindleError::InvalidConfiguration(_)));
    }

    #[test]
    fn pool_grows_under_load_and_shrinks_when_idle() {
        let config = QueueServiceConfig::bounded(1, 3)
            .with_scale_up_threshold(1)
            .with_idle_timeout(Duration::from_millis(50));
        let queue = service(config);
        queue.start().unwrap();
        assert_eq!(queue.worker_count(), 1);

        let gate = Arc::new(AtomicBool::new(false));
        let first = queue.submit(gated(&gate), 0).unwrap();
        wait_for_state(&first, JobState::Running);
        for _ in 0..6 {
            queue.submit(gated(&gate), 0).unwrap();
        }
        let grown = queue.worker_count();
        assert!((2..=3).contains(&grown), "grew to {grown}");

        gate.store(true, Ordering::SeqCst);
        assert!(queue.wait_idle(LONG));

        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.worker_count() > 1 {
            assert!(Instant::now() < deadline, "extra workers never retired");
            std::thread::sleep(Duration::from_millis(10));
        }
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(queue.worker_count(), 1);

        let handle = queue.submit(Job::from_fn(|| {}), 0).unwrap();
        assert!(handle.result(LONG).is_ok());
    }

    #[test]
    fn workers_are_named_after_the_prefix() {
        let queue = service(QueueServiceConfig::fixed(1).with_thread_name_prefix("pool"));
        assert_eq!(queue.config().thread_name_prefix, "pool");
        queue.start().unwrap();
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let handle = queue
            .submit(
                Job::new(move |ctx| {
                    *sink.lock() = ctx.worker().to_string();
                    Ok(())
                }),
                0,
            )
            .unwrap();

        assert!(handle.result(LONG).is_ok());
        assert_eq!(*seen.lock(), "pool-0");
        assert_eq!(handle.status().worker.as_deref(), Some("pool-0"));
    }

    #[test]
    fn timestamps_come_from_the_clock_port() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(at));
        let ids = Arc::new(UlidGenerator::new(FixedClock::new(at)));
        let queue =
            QueueService::with_ports(QueueServiceConfig::fixed(1), clock, ids).unwrap();

        let handle = queue.submit(Job::from_fn(|| {}), 0).unwrap();
        queue.start().unwrap();
        assert!(handle.result(LONG).is_ok());

        let status = handle.status();
        assert_eq!(status.submitted_at, at);
        assert_eq!(status.finished_at, Some(at));
        assert_eq!(
            status.job_id.as_ulid().timestamp_ms(),
            at.timestamp_millis() as u64
        );
    }

    #[test]
    fn independent_services_do_not_interfere() {
        let a = service(QueueServiceConfig::fixed(1));
        let b = service(QueueServiceConfig::fixed(1));
        a.start().unwrap();
        b.start().unwrap();
        a.stop(false).unwrap();

        let handle = b.submit(Job::from_fn(|| {}), 0).unwrap();
        assert!(handle.result(LONG).is_ok());
        assert!(a.submit(Job::from_fn(|| {}), 0).is_err());
    }

    #[test]
    fn drop_stops_the_pool() {
        let queue = service(QueueServiceConfig::fixed(2));
        queue.start().unwrap();
        let handle = queue.submit(Job::from_fn(|| {}), 0).unwrap();
        assert!(handle.result(LONG).is_ok());
        drop(queue);
        assert_eq!(handle.state(), JobState::Done);
    }

    #[test]
    fn counts_serialize() {
        let queue = service(QueueServiceConfig::fixed(1));
        queue.submit(Job::from_fn(|| {}), 0).unwrap();
        let json = serde_json::to_value(queue.counts()).unwrap();
        assert_eq!(json["waiting"], 1);
        assert_eq!(json["workers"], 0);
        assert_eq!(serde_json::to_value(queue.status()).unwrap(), "idle");
    }
}
