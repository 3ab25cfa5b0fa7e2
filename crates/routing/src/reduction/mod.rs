//! Map-reduce supervision.
//!
//! A reduction waits for every map sub-task in a dependency set to finish,
//! then submits its reduce task exactly once. Waiting is a timer on a tokio
//! task, never a held worker slot.

mod job;
mod scheduler;
mod tracker;

pub use job::{JobState, PollOutcome, ReduceSubmitter, ReductionJob, ReductionOutcome};
pub use scheduler::{ReductionHandle, ReductionScheduler};
pub use tracker::{DependencyTracker, InMemoryDependencyTracker};
