use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use marshal_core::TaskId;

use crate::error::RoutingError;

/// Result of one atomic read-increment-compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Dispatch under this zero-based attempt number.
    Admitted(u32),
    /// Budget used up; the counter is left unchanged.
    Exhausted(u32),
}

/// Durable per-task attempt counters.
///
/// `begin_attempt` must be atomic: two concurrent retries of the same task
/// may not both observe a count below the budget.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn begin_attempt(&self, task: &TaskId, max_attempts: u32) -> Result<AttemptOutcome, RoutingError>;

    /// Attempts started so far.
    async fn attempts(&self, task: &TaskId) -> Result<u32, RoutingError>;

    /// Forget a task that reached a terminal state.
    async fn clear(&self, task: &TaskId) -> Result<(), RoutingError>;
}

/// Single-process attempt store.
#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    counts: Mutex<HashMap<TaskId, u32>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.counts.lock().await.len()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn begin_attempt(&self, task: &TaskId, max_attempts: u32) -> Result<AttemptOutcome, RoutingError> {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(task.clone()).or_insert(0);
        if *count >= max_attempts {
            return Ok(AttemptOutcome::Exhausted(*count));
        }
        let attempt = *count;
        *count += 1;
        Ok(AttemptOutcome::Admitted(attempt))
    }

    async fn attempts(&self, task: &TaskId) -> Result<u32, RoutingError> {
        Ok(self.counts.lock().await.get(task).copied().unwrap_or(0))
    }

    async fn clear(&self, task: &TaskId) -> Result<(), RoutingError> {
        self.counts.lock().await.remove(task);
        Ok(())
    }
}
