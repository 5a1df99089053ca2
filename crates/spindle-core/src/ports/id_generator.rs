//! IdGenerator port.

use crate::domain::{JobId, ThreadId};
use crate::ports::Clock;
use ulid::Ulid;

/// Generates ids for jobs and managed threads.
///
/// Must be `Send + Sync`: a queue service mints job ids from any
/// submitting thread.
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_thread_id(&self) -> ThreadId;
}

/// ULID generator. The timestamp part comes from the clock, the rest is random.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_thread_id(&self) -> ThreadId {
        ThreadId::from(self.next_ulid())
    }
}
