//! Worker loop run by every managed thread a queue service owns.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ServiceShared, ServiceStatus};
use crate::error::panic_reason;
use crate::job::{JobContext, JobEntry};
use crate::thread::ThreadContext;

pub(crate) fn worker_loop(shared: &ServiceShared, ctx: &ThreadContext) {
    debug!(worker = ctx.name(), "worker started");
    while let Some(job) = next_job(shared, ctx) {
        execute(shared, ctx.name(), job);
    }
    debug!(worker = ctx.name(), "worker exited");
}

/// Block until a job can be claimed, or return `None` when this worker
/// should exit. The live worker count is released on the way out, under the
/// same lock that made the decision.
fn next_job(shared: &ServiceShared, ctx: &ThreadContext) -> Option<Arc<JobEntry>> {
    let mut state = shared.state.lock();
    loop {
        let exit = ctx.stop_requested()
            || match state.status {
                ServiceStatus::Stopping => !state.drain || state.ready.is_empty(),
                ServiceStatus::Stopped => true,
                ServiceStatus::Idle | ServiceStatus::Running | ServiceStatus::Paused => false,
            };
        if exit {
            state.live_workers = state.live_workers.saturating_sub(1);
            return None;
        }

        if matches!(state.status, ServiceStatus::Running | ServiceStatus::Stopping) {
            while let Some(job) = state.ready.pop() {
                // ready jobs are always Waiting; the claim is the CAS that
                // guarantees a single runner regardless
                if job.try_claim(ctx.name(), shared.clock.now()) {
                    state.running.insert(job.id(), Arc::clone(&job));
                    return Some(job);
                }
            }
        }

        state.idle_workers += 1;
        let can_retire = state.live_workers > shared.min_workers;
        let timed_out = if can_retire {
            shared
                .work
                .wait_for(&mut state, shared.config.idle_timeout())
                .timed_out()
        } else {
            shared.work.wait(&mut state);
            false
        };
        state.idle_workers -= 1;

        if timed_out
            && state.status == ServiceStatus::Running
            && state.ready.is_empty()
            && state.live_workers > shared.min_workers
        {
            debug!(worker = ctx.name(), "idle worker retiring");
            state.live_workers -= 1;
            return None;
        }
    }
}

fn execute(shared: &ServiceShared, worker: &str, job: Arc<JobEntry>) {
    debug!(job = %job.id(), worker, priority = %job.priority(), "job claimed");

    let outcome = match job.take_payload() {
        Some(payload) => {
            let ctx = JobContext::new(Arc::clone(&job), worker.to_string());
            match catch_unwind(AssertUnwindSafe(|| payload(&ctx))) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.to_string()),
                Err(panic) => Err(panic_reason(panic.as_ref())),
            }
        }
        None => Err("payload missing".to_string()),
    };

    if let Err(reason) = &outcome {
        warn!(job = %job.id(), worker, %reason, "job failed");
    }
    let succeeded = outcome.is_ok();

    // handle waiters wake on `finish`; the counters must already agree with
    // the job by the time they can take the queue lock
    let mut state = shared.state.lock();
    job.finish(outcome, shared.clock.now());
    state.running.remove(&job.id());
    if succeeded {
        state.done += 1;
    } else {
        state.failed += 1;
    }
    if state.is_idle() {
        shared.idle.notify_all();
    }
}
