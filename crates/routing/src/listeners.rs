//! Worker listener announcements.
//!
//! Workers report the queues they drain. With enforcement on, the
//! dispatcher refuses to publish a dynamically routed task to a queue that
//! nobody drains, which is what a producer and a worker with different
//! resource toggles look like from the producer's side. The mismatch is
//! only reported; fixing it needs a fleet-wide config change.

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::{debug, info};

use marshal_core::config::RoutingConfig;
use marshal_core::QueueName;

use crate::error::RoutingError;
use crate::router::Route;

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    enforce: bool,
    workers: RwLock<HashMap<String, HashSet<QueueName>>>,
}

impl ListenerRegistry {
    pub fn new(enforce: bool) -> Self {
        Self {
            enforce,
            workers: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        Self::new(config.enforce_listeners)
    }

    /// Whether dynamic routes are checked against announcements.
    pub fn is_tracking(&self) -> bool {
        self.enforce
    }

    /// Replace the set of queues `worker` drains.
    pub async fn announce(&self, worker: impl Into<String>, queues: impl IntoIterator<Item = QueueName>) {
        let worker = worker.into();
        let queues: HashSet<QueueName> = queues.into_iter().collect();
        info!(worker = %worker, queues = queues.len(), "worker announced");
        self.workers.write().await.insert(worker, queues);
    }

    /// Forget a worker. Returns false if it never announced.
    pub async fn retire(&self, worker: &str) -> bool {
        let removed = self.workers.write().await.remove(worker).is_some();
        if removed {
            info!(worker = %worker, "worker retired");
        }
        removed
    }

    pub async fn has_listener(&self, queue: &QueueName) -> bool {
        self.workers.read().await.values().any(|queues| queues.contains(queue))
    }

    /// Every queue drained by at least one worker, sorted.
    pub async fn drained_queues(&self) -> BTreeSet<QueueName> {
        self.workers
            .read()
            .await
            .values()
            .flat_map(|queues| queues.iter().cloned())
            .collect()
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Reject a dynamic route whose queue has no listener. Static routes and
    /// an untracked registry always pass.
    pub async fn check(&self, route: &Route) -> Result<(), RoutingError> {
        if !self.enforce || !route.is_dynamic() {
            return Ok(());
        }
        if self.has_listener(route.queue()).await {
            debug!(queue = %route.queue(), "listener present");
            return Ok(());
        }
        Err(RoutingError::StaleToggleMismatch {
            queue: route.queue().clone(),
        })
    }
}
