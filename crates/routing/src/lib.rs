//! Task routing and scheduling for the marshal worker fleet.
//!
//! Producers hand a [`TaskInstance`] to the [`Dispatcher`], which resolves
//! its queue from the [`QueueCatalog`], spends one attempt from the retry
//! budget and publishes it through a [`marshal_queue::TaskBroker`].
//! Reductions over map sub-tasks are supervised by the
//! [`ReductionScheduler`]; extraction producers size their fan-out with the
//! [`BatchPlanner`].

pub mod batch;
pub mod catalog;
pub mod classify;
pub mod dispatch;
pub mod error;
pub mod listeners;
pub mod metrics;
pub mod reduction;
pub mod retry;
pub mod router;
pub mod task;

pub use batch::{Batch, BatchPlan, BatchPlanner, BatchUnit, Batches, SamplingPlan};
pub use catalog::{QueueCatalog, QueueRole, ResourceRole, RoutingTable};
pub use classify::{TaskCategory, TaskCategorySet, TaskClassifier};
pub use dispatch::{Dispatcher, RecoveryReport, Submission};
pub use error::RoutingError;
pub use listeners::ListenerRegistry;
pub use metrics::{DispatchMetrics, SharedMetrics};
pub use reduction::{
    DependencyTracker, InMemoryDependencyTracker, JobState, PollOutcome, ReduceSubmitter,
    ReductionHandle, ReductionJob, ReductionOutcome, ReductionScheduler,
};
pub use retry::{
    AttemptOutcome, AttemptStore, Decision, InMemoryAttemptStore, InterruptReason, Recovery,
    RetryPolicy,
};
pub use router::{
    DynamicResourceRouter, ResourceQueueToggle, ResourceRoute, Route, RoutePath, Router,
    StaticRouter,
};
pub use task::TaskInstance;
