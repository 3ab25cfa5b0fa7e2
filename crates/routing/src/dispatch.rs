//! Producer-facing entry point.
//!
//! [`Dispatcher`] is the only place that turns a [`TaskInstance`] into a
//! broker message: route, listener check, attempt admission, envelope,
//! submit. Every step before the broker call fails fast.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use marshal_core::config::ReductionConfig;
use marshal_core::{Config, QueueName, ResourceId, TaskId, TaskKind};
use marshal_queue::{MessageId, TaskBroker};

use crate::batch::{BatchPlanner, Batches};
use crate::catalog::QueueCatalog;
use crate::classify::TaskClassifier;
use crate::error::RoutingError;
use crate::listeners::ListenerRegistry;
use crate::metrics::{new_shared_metrics, DispatchMetrics, SharedMetrics};
use crate::reduction::{DependencyTracker, ReduceSubmitter, ReductionJob, ReductionScheduler};
use crate::retry::{AttemptStore, Decision, InterruptReason, Recovery, RetryPolicy};
use crate::router::{ResourceQueueToggle, Route, RoutePath, Router};
use crate::task::TaskInstance;

/// A message the broker accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub queue: QueueName,
    pub path: RoutePath,
    pub attempt: u32,
    pub message_id: MessageId,
}

/// What happened to each in-flight task found after a restart.
#[derive(Debug, Default, Serialize)]
pub struct RecoveryReport {
    pub resubmitted: Vec<Submission>,
    /// Non-restartable tasks handed back to their caller.
    pub surfaced: Vec<(TaskId, InterruptReason)>,
    pub exhausted: Vec<TaskId>,
    /// Restartable tasks whose resubmission failed, with the error.
    pub failed: Vec<(TaskId, String)>,
}

pub struct Dispatcher {
    catalog: Arc<QueueCatalog>,
    router: Router,
    retry: RetryPolicy,
    planner: BatchPlanner,
    broker: Arc<dyn TaskBroker>,
    listeners: Arc<ListenerRegistry>,
    metrics: SharedMetrics,
    reduction: ReductionConfig,
}

impl Dispatcher {
    /// Wire every routing component from process config.
    ///
    /// Rejects a config that `Config::validate` refuses, so a zero attempt
    /// budget fails here instead of on every submit.
    pub fn new(
        config: &Config,
        catalog: Arc<QueueCatalog>,
        broker: Arc<dyn TaskBroker>,
        attempts: Arc<dyn AttemptStore>,
    ) -> Result<Self, RoutingError> {
        config.validate()?;
        let toggle = ResourceQueueToggle::from_config(&config.routing);
        info!(
            broker = broker.provider(),
            per_model_queues = toggle.model,
            per_retriever_queues = toggle.retriever,
            fingerprint = %catalog.fingerprint(&toggle),
            "dispatcher ready"
        );
        Ok(Self {
            router: Router::new(catalog.clone(), toggle),
            retry: RetryPolicy::new(
                attempts,
                TaskClassifier::new(catalog.clone()),
                &config.retry,
                &config.deployment,
            ),
            planner: BatchPlanner::new(catalog.clone(), config.batch.clone()),
            listeners: Arc::new(ListenerRegistry::from_config(&config.routing)),
            metrics: new_shared_metrics(),
            reduction: config.reduction.clone(),
            catalog,
            broker,
        })
    }

    /// Share a registry fed by worker heartbeats.
    pub fn with_listeners(mut self, listeners: Arc<ListenerRegistry>) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn catalog(&self) -> &Arc<QueueCatalog> {
        &self.catalog
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn planner(&self) -> &BatchPlanner {
        &self.planner
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Snapshot of the dispatch counters.
    pub fn metrics(&self) -> DispatchMetrics {
        self.metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn metrics_handle(&self) -> SharedMetrics {
        Arc::clone(&self.metrics)
    }

    /// A new instance carrying the configured attempt budget.
    pub fn instance(&self, kind: impl Into<TaskKind>, payload: serde_json::Value) -> TaskInstance {
        self.retry.instance(kind, payload)
    }

    pub fn resolve_queue(
        &self,
        kind: &TaskKind,
        resource_id: Option<&ResourceId>,
    ) -> Result<Route, RoutingError> {
        self.router.resolve_queue(kind, resource_id)
    }

    pub async fn admit_retry(&self, instance: &mut TaskInstance) -> Result<Decision, RoutingError> {
        self.retry.admit(instance).await
    }

    /// Forget the attempt count of a task that reached a terminal state.
    pub async fn complete(&self, task_id: &TaskId) -> Result<(), RoutingError> {
        self.retry.complete(task_id).await
    }

    pub fn plan_batches(&self, total: u64, kind: &TaskKind) -> Result<Batches, RoutingError> {
        self.planner.plan_batches(total, kind)
    }

    /// Route, admit and publish one task.
    pub async fn submit(&self, mut instance: TaskInstance) -> Result<Submission, RoutingError> {
        let route = self.router.resolve_queue(&instance.kind, instance.resource_id.as_ref())?;

        if let Err(err) = self.listeners.check(&route).await {
            self.update_metrics(|m| m.stale_mismatches += 1);
            warn!(kind = %instance.kind, queue = %route.queue(), "no listener for dynamically routed queue");
            return Err(err);
        }

        let attempt = match self.retry.admit(&mut instance).await? {
            Decision::Dispatch { attempt } => attempt,
            Decision::Exhausted { attempts } => {
                self.update_metrics(|m| m.exhausted += 1);
                return Err(RoutingError::AttemptsExhausted {
                    task_id: instance.id,
                    kind: instance.kind,
                    attempts,
                });
            }
        };

        let path = route.path();
        let queue = route.into_queue();
        let envelope = instance.to_envelope(queue.clone());
        let message_id = self.broker.submit(&queue, &envelope).await?;

        self.update_metrics(|m| {
            m.record_route(path);
            m.record_submission(&queue);
        });
        debug!(
            task_id = %instance.id,
            kind = %instance.kind,
            queue = %queue,
            path = %path,
            attempt,
            message_id = %message_id,
            "task submitted"
        );

        Ok(Submission {
            task_id: instance.id,
            kind: instance.kind,
            queue,
            path,
            attempt,
            message_id,
        })
    }

    /// Apply the restart policy to tasks that were in flight when their
    /// workers went away.
    ///
    /// One failed resubmission never stops the rest; it lands in
    /// `RecoveryReport::failed`.
    pub async fn recover_interrupted(&self, instances: Vec<TaskInstance>) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        for instance in instances {
            match self.retry.on_interrupted(&instance) {
                Recovery::Resubmit => {
                    let task_id = instance.id.clone();
                    match self.submit(instance).await {
                        Ok(submission) => report.resubmitted.push(submission),
                        Err(RoutingError::AttemptsExhausted { task_id, .. }) => {
                            report.exhausted.push(task_id)
                        }
                        Err(err) => {
                            warn!(task_id = %task_id, error = %err, "interrupted task could not be resubmitted");
                            report.failed.push((task_id, err.to_string()));
                        }
                    }
                }
                Recovery::Surface { reason } => {
                    warn!(task_id = %instance.id, kind = %instance.kind, reason = ?reason, "interrupted task needs explicit resubmission");
                    report.surfaced.push((instance.id, reason));
                }
            }
        }
        info!(
            resubmitted = report.resubmitted.len(),
            surfaced = report.surfaced.len(),
            exhausted = report.exhausted.len(),
            failed = report.failed.len(),
            "interrupted task recovery finished"
        );
        report
    }

    /// Reduction scheduler that submits reduce tasks through this dispatcher.
    pub fn reduction_scheduler(self: &Arc<Self>, tracker: Arc<dyn DependencyTracker>) -> ReductionScheduler {
        ReductionScheduler::new(tracker, self.clone(), &self.reduction).with_metrics(self.metrics_handle())
    }

    fn update_metrics(&self, f: impl FnOnce(&mut DispatchMetrics)) {
        if let Ok(mut m) = self.metrics.write() {
            f(&mut m);
        }
    }
}

#[async_trait]
impl ReduceSubmitter for Dispatcher {
    async fn submit_reduce(&self, job: &ReductionJob) -> Result<MessageId, RoutingError> {
        let mut payload = job.payload().clone();
        if let Some(fields) = payload.as_object_mut() {
            fields
                .entry("dependency_set_id")
                .or_insert_with(|| serde_json::Value::String(job.dependency_set_id().to_string()));
        }
        let instance = TaskInstance {
            id: job.reduce_task_id().clone(),
            kind: job.reduce_kind().clone(),
            payload,
            resource_id: None,
            attempt: 0,
            max_attempts: self.retry.max_attempts(),
        };
        Ok(self.submit(instance).await?.message_id)
    }

    async fn reduce_dispatched(&self, job: &ReductionJob) -> Result<(), RoutingError> {
        self.complete(job.reduce_task_id()).await
    }
}
