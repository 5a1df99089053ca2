//! Domain model: identifiers, lifecycle states, priorities.

pub mod ids;
pub mod priority;
pub mod state;

pub use ids::{Id, IdMarker, JobId, ThreadId};
pub use priority::Priority;
pub use state::{JobState, ThreadState};
