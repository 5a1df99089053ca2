//! spindle: demo driver for the queue service and the timer.
//!
//! - `spindle jobs` submits a batch of jobs with mixed priorities and prints
//!   a JSON report of the final counts and the jobs that failed
//! - `spindle timer` runs a repeating timer until its tick limit or Ctrl-C

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};

use spindle_core::{
    Job, JobState, JobStatus, Priority, QueueCounts, QueueService, QueueServiceConfig, Timer,
    TimerConfig,
};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "spindle", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a batch of jobs through a queue service.
    Jobs(JobsArgs),
    /// Run a repeating timer.
    Timer(TimerArgs),
}

#[derive(Args, Debug)]
struct JobsArgs {
    /// JSON file holding a queue service config. Flags override it.
    #[arg(long, env = "SPINDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Minimum (and initial) worker count. 0 = available parallelism.
    #[arg(long)]
    workers: Option<usize>,

    /// Upper bound for the worker pool under load.
    #[arg(long)]
    max_workers: Option<usize>,

    #[arg(long, default_value_t = 24)]
    jobs: usize,

    /// Simulated work per job, in milliseconds.
    #[arg(long, default_value_t = 20)]
    work_ms: u64,

    /// Make every n-th job fail.
    #[arg(long)]
    fail_every: Option<usize>,

    /// Stop without draining: queued jobs are cancelled.
    #[arg(long)]
    discard: bool,
}

#[derive(Args, Debug)]
struct TimerArgs {
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Stop after this many ticks. Runs until Ctrl-C otherwise.
    #[arg(long)]
    ticks: Option<u64>,

    /// Subtract the callback duration from the next sleep.
    #[arg(long)]
    precise: bool,

    /// Simulated callback duration, in milliseconds.
    #[arg(long, default_value_t = 0)]
    work_ms: u64,
}

// ── jobs ────────────────────────────────────────────────────────────

fn load_config(args: &JobsArgs) -> anyhow::Result<QueueServiceConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => QueueServiceConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.min_workers = workers;
    }
    if let Some(max) = args.max_workers {
        config.max_workers = max;
    }
    Ok(config)
}

/// What `spindle jobs` prints once the service has stopped.
#[derive(Debug, Serialize)]
struct JobsReport {
    counts: QueueCounts,
    failed: Vec<JobStatus>,
}

fn run_jobs(args: JobsArgs) -> anyhow::Result<JobsReport> {
    let config = load_config(&args)?;
    let queue = QueueService::new(config)?;
    queue.start()?;

    let priorities = [Priority::LOW, Priority::NORMAL, Priority::HIGH];
    let work = Duration::from_millis(args.work_ms);
    let mut handles = Vec::with_capacity(args.jobs);
    for i in 0..args.jobs {
        let fails = args.fail_every.is_some_and(|n| n > 0 && (i + 1) % n == 0);
        let job = Job::new(move |ctx| {
            debug!(job = %ctx.job_id(), worker = ctx.worker(), "working");
            std::thread::sleep(work);
            if fails {
                return Err(format!("job #{i} failed on purpose").into());
            }
            Ok(())
        })
        .with_name(format!("demo-{i}"));
        handles.push(queue.submit(job, priorities[i % priorities.len()])?);
    }
    info!(jobs = handles.len(), workers = queue.worker_count(), "jobs submitted");

    queue.stop(!args.discard)?;

    let failed: Vec<JobStatus> = handles
        .iter()
        .filter(|h| h.state() == JobState::Failed)
        .map(|h| h.status())
        .collect();
    for status in &failed {
        let reason = status.failure.as_deref().unwrap_or_default();
        warn!(job = %status.job_id, reason, "job failed");
    }
    Ok(JobsReport {
        counts: queue.counts(),
        failed,
    })
}

// ── timer ───────────────────────────────────────────────────────────

async fn run_timer(args: TimerArgs) -> anyhow::Result<()> {
    let mut config = TimerConfig::new(Duration::from_millis(args.interval_ms))
        .with_precise(args.precise)
        .with_name("spindle-timer");
    if let Some(ticks) = args.ticks {
        config = config.with_max_cycles(ticks);
    }

    let work = Duration::from_millis(args.work_ms);
    let timer = Arc::new(Timer::new(config, move |tick| {
        info!(cycle = tick.cycle, elapsed_ms = tick.elapsed_ms(), "tick");
        std::thread::sleep(work);
        Ok(true)
    })?);
    timer.start()?;

    let finished = {
        let timer = Arc::clone(&timer);
        tokio::task::spawn_blocking(move || timer.wait(None))
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, stopping timer");
            timer.stop_and_wait(Some(Duration::from_secs(5)))?;
        }
        joined = finished => {
            joined.context("timer waiter panicked")?;
        }
    }

    timer.result()?;
    info!(
        ticks = timer.ticks(),
        last_sleep_ms = timer.last_sleep().map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        "timer finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Jobs(args) => {
            let report = tokio::task::spawn_blocking(move || run_jobs(args))
                .await
                .context("jobs runner panicked")??;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Timer(args) => run_timer(args).await,
    }
}
