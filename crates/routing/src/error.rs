use thiserror::Error;

use marshal_core::{CoreError, DependencySetId, QueueName, ResourceId, TaskId, TaskKind};
use marshal_queue::QueueError;

/// Errors raised by routing, retry, batching, and reduction.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("unknown task kind: {0}")]
    UnknownTaskKind(TaskKind),

    #[error("invalid resource id {resource_id:?} for {kind}")]
    InvalidResourceId { kind: TaskKind, resource_id: Option<ResourceId> },

    #[error("task {task_id} ({kind}) exhausted after {attempts} attempts")]
    AttemptsExhausted { task_id: TaskId, kind: TaskKind, attempts: u32 },

    #[error("no active worker drains {queue}; resource queue toggles differ across the fleet")]
    StaleToggleMismatch { queue: QueueName },

    #[error("routing catalog error: {0}")]
    Catalog(String),

    #[error("routing catalog parse error: {0}")]
    CatalogParse(#[from] toml::de::Error),

    #[error("routing catalog I/O error: {0}")]
    CatalogIo(#[from] std::io::Error),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("sampling rate must be at least 1")]
    InvalidSamplingRate,

    #[error("task kind {0} has no batch unit")]
    NotBatchable(TaskKind),

    #[error("dependency tracker error: {0}")]
    Tracker(String),

    #[error("a reduction is already scheduled for dependency set {0}")]
    DuplicateReduction(DependencySetId),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] CoreError),
}
