//! In-process broker: one FIFO per queue name.
//!
//! Used by tests and by single-host runs where producers and workers share
//! a process. Messages stay queued until [`InMemoryBroker::drain`] or
//! [`InMemoryBroker::pop`] takes them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use marshal_core::QueueName;

use crate::broker::{QueueHealth, TaskBroker};
use crate::envelope::{MessageId, TaskEnvelope};
use crate::error::QueueError;

#[derive(Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<QueueName, VecDeque<(MessageId, TaskEnvelope)>>>,
    next_id: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting on `queue`.
    pub async fn depth(&self, queue: &QueueName) -> usize {
        self.queues.lock().await.get(queue).map_or(0, VecDeque::len)
    }

    /// Take the oldest message from `queue`.
    pub async fn pop(&self, queue: &QueueName) -> Option<TaskEnvelope> {
        self.queues
            .lock()
            .await
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
            .map(|(_, env)| env)
    }

    /// Take every message from `queue`, oldest first.
    pub async fn drain(&self, queue: &QueueName) -> Vec<TaskEnvelope> {
        self.queues
            .lock()
            .await
            .remove(queue)
            .map(|q| q.into_iter().map(|(_, env)| env).collect())
            .unwrap_or_default()
    }

    /// Names of every queue that currently holds messages.
    pub async fn queue_names(&self) -> Vec<QueueName> {
        let queues = self.queues.lock().await;
        let mut names: Vec<_> = queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl TaskBroker for InMemoryBroker {
    async fn submit(&self, queue: &QueueName, envelope: &TaskEnvelope) -> Result<MessageId, QueueError> {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = MessageId(format!("mem-{seq}"));
        self.queues
            .lock()
            .await
            .entry(queue.clone())
            .or_default()
            .push_back((id.clone(), envelope.clone()));
        debug!(queue = %queue, message_id = %id, kind = %envelope.kind, "queued in memory");
        Ok(id)
    }

    async fn health_check(&self, queue: &QueueName) -> Result<QueueHealth, QueueError> {
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: Some(self.depth(queue).await as u64),
            provider: self.provider().to_string(),
        })
    }

    fn provider(&self) -> &str {
        "memory"
    }
}
