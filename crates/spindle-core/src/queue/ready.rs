//! Ready queue ordered by priority, then submission order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::domain::JobId;
use crate::job::JobEntry;

/// Heap entry. `BinaryHeap` is a max-heap, so "greater" means "claimed
/// first": higher priority wins, and among equal priorities the lower
/// submission sequence wins.
struct Ready(Arc<JobEntry>);

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority()
            .cmp(&other.0.priority())
            .then_with(|| other.0.seq().cmp(&self.0.seq()))
    }
}

#[derive(Default)]
pub(crate) struct ReadyQueue {
    heap: BinaryHeap<Ready>,
}

impl ReadyQueue {
    pub(crate) fn push(&mut self, job: Arc<JobEntry>) {
        self.heap.push(Ready(job));
    }

    pub(crate) fn pop(&mut self) -> Option<Arc<JobEntry>> {
        self.heap.pop().map(|ready| ready.0)
    }

    /// Remove one job. Returns whether it was queued.
    pub(crate) fn remove(&mut self, id: JobId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|ready| ready.0.id() != id);
        self.heap.len() != before
    }

    /// Take every queued job, highest priority first.
    pub(crate) fn drain(&mut self) -> Vec<Arc<JobEntry>> {
        let mut jobs = Vec::with_capacity(self.heap.len());
        while let Some(job) = self.pop() {
            jobs.push(job);
        }
        jobs
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
