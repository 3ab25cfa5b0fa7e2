use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use marshal_core::QueueName;

use crate::router::RoutePath;

/// Shared handle written by the dispatcher and the reduction scheduler.
pub type SharedMetrics = Arc<RwLock<DispatchMetrics>>;

pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(RwLock::new(DispatchMetrics::default()))
}

/// Dispatch counters exposed to operators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchMetrics {
    /// Messages accepted by the broker, by destination queue.
    pub submitted_by_queue: BTreeMap<QueueName, u64>,
    pub routes_static: u64,
    pub routes_scoped: u64,
    pub routes_fallback: u64,
    /// Admissions refused because the attempt budget was spent.
    pub exhausted: u64,
    /// Dynamic routes to a queue with no announced listener.
    pub stale_mismatches: u64,
    pub reductions_scheduled: u64,
    pub reductions_dispatched: u64,
    pub reductions_cancelled: u64,
    pub reductions_failed: u64,
    pub last_submission: Option<DateTime<Utc>>,
}

impl DispatchMetrics {
    pub fn record_route(&mut self, path: RoutePath) {
        match path {
            RoutePath::Static => self.routes_static += 1,
            RoutePath::Scoped => self.routes_scoped += 1,
            RoutePath::Fallback => self.routes_fallback += 1,
        }
    }

    pub fn record_submission(&mut self, queue: &QueueName) {
        *self.submitted_by_queue.entry(queue.clone()).or_default() += 1;
        self.last_submission = Some(Utc::now());
    }

    pub fn total_submitted(&self) -> u64 {
        self.submitted_by_queue.values().sum()
    }
}
