//! Run orchestration: per-creative processing, progress and page runs.

pub mod creative;
pub mod job;
pub mod progress;
pub mod single_flight;

pub use creative::{CreativePipeline, CreativeState};
pub use job::{JobRunner, RunContext};
pub use progress::ProgressTracker;
pub use single_flight::{HashLockGuard, HashLocks, InFlightGuard, InFlightSet};
