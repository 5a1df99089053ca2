use serde::{Deserialize, Serialize};

/// Point-in-time view of a queue service.
///
/// `done`, `failed` and `cancelled` are cumulative since the service was
/// created; the other fields are current values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub running: usize,
    pub done: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub workers: usize,
    pub idle_workers: usize,
}

impl QueueCounts {
    /// Nothing queued and nothing executing.
    pub fn is_idle(&self) -> bool {
        self.waiting == 0 && self.running == 0
    }
}
