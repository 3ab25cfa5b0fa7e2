//! Broker trait consumed by the dispatcher.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use marshal_core::QueueName;

use crate::envelope::{MessageId, TaskEnvelope};
use crate::error::QueueError;

/// Health status of one queue on the broker.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    /// Whether the queue is reachable.
    pub connected: bool,
    /// Approximate number of messages waiting in the queue.
    pub approximate_message_count: Option<u64>,
    /// Broker provider name (e.g., "sqs", "memory").
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueHealth {{ connected: {}, messages: {:?}, provider: {} }}",
            self.connected, self.approximate_message_count, self.provider
        )
    }
}

/// Submission side of a message broker with at-least-once delivery.
///
/// Implementations must hold an accepted message durably until a worker
/// acknowledges it. Load balancing inside a queue is the broker's concern.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Enqueue `envelope` on `queue` and return the broker's message id.
    async fn submit(&self, queue: &QueueName, envelope: &TaskEnvelope) -> Result<MessageId, QueueError>;

    /// Check queue connectivity and return health status.
    async fn health_check(&self, queue: &QueueName) -> Result<QueueHealth, QueueError>;

    /// Provider name for logs.
    fn provider(&self) -> &str;
}

#[async_trait]
impl<T: TaskBroker + ?Sized> TaskBroker for Arc<T> {
    async fn submit(&self, queue: &QueueName, envelope: &TaskEnvelope) -> Result<MessageId, QueueError> {
        (**self).submit(queue, envelope).await
    }

    async fn health_check(&self, queue: &QueueName) -> Result<QueueHealth, QueueError> {
        (**self).health_check(queue).await
    }

    fn provider(&self) -> &str {
        (**self).provider()
    }
}
