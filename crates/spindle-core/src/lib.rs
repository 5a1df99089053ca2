//! spindle-core
//!
//! Concurrent execution building blocks on plain OS threads.
//!
//! # モジュール構成
//! - **domain**: ids, priority, job / thread state machines
//! - **ports**: Clock, IdGenerator
//! - **thread**: ManagedThread (start / suspend / resume / stop / wait) と ThreadContext
//! - **job**: Job, JobHandle, JobContext, JobStatus
//! - **queue**: QueueService（優先度付きキュー + ワーカープール）
//! - **timer**: Timer（precise / non-precise の繰り返しタイマー）
//! - **observability**: QueueCounts
//! - **error**: SpindleError
//!
//! ```no_run
//! use spindle_core::{Job, Priority, QueueService, QueueServiceConfig};
//!
//! let queue = QueueService::new(QueueServiceConfig::fixed(2))?;
//! queue.start()?;
//! let handle = queue.submit(Job::from_fn(|| println!("hello")), Priority::HIGH)?;
//! handle.result(None)?;
//! queue.stop(true)?;
//! # Ok::<(), spindle_core::SpindleError>(())
//! ```

pub mod domain;
pub mod error;
pub mod job;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod thread;
pub mod timer;

pub use domain::{JobId, JobState, Priority, ThreadId, ThreadState};
pub use error::{BoxError, Result, SpindleError};
pub use job::{Job, JobContext, JobHandle, JobStatus};
pub use observability::QueueCounts;
pub use queue::{QueueService, QueueServiceConfig, ServiceStatus};
pub use thread::{ManagedThread, ThreadContext};
pub use timer::{Tick, Timer, TimerConfig};
