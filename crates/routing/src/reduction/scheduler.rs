use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use marshal_core::config::ReductionConfig;
use marshal_core::{DependencySetId, TaskKind};

use super::job::{JobState, PollOutcome, ReduceSubmitter, ReductionJob, ReductionOutcome};
use super::tracker::DependencyTracker;
use crate::error::RoutingError;
use crate::metrics::SharedMetrics;

type JobMap = Arc<RwLock<HashMap<DependencySetId, Arc<ReductionJob>>>>;

/// Supervises reductions, one tokio task per job.
///
/// A job's task polls immediately, then sleeps between polls; nothing is
/// held while it sleeps, so thousands of pending reductions cost only
/// their timers.
pub struct ReductionScheduler {
    tracker: Arc<dyn DependencyTracker>,
    submitter: Arc<dyn ReduceSubmitter>,
    poll_interval: Duration,
    jobs: JobMap,
    metrics: Option<SharedMetrics>,
}

impl ReductionScheduler {
    pub fn new(
        tracker: Arc<dyn DependencyTracker>,
        submitter: Arc<dyn ReduceSubmitter>,
        config: &ReductionConfig,
    ) -> Self {
        Self {
            tracker,
            submitter,
            poll_interval: config.poll_interval(),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start supervising the reduction of `dependency_set_id`.
    ///
    /// At most one live reduction per dependency set.
    pub async fn schedule(
        &self,
        dependency_set_id: DependencySetId,
        reduce_kind: TaskKind,
        payload: serde_json::Value,
    ) -> Result<ReductionHandle, RoutingError> {
        let job = {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&dependency_set_id) {
                return Err(RoutingError::DuplicateReduction(dependency_set_id));
            }
            let job = Arc::new(ReductionJob::new(
                dependency_set_id.clone(),
                reduce_kind,
                payload,
                self.poll_interval,
                self.tracker.clone(),
                self.submitter.clone(),
            ));
            jobs.insert(dependency_set_id, job.clone());
            job
        };

        if let Some(metrics) = &self.metrics {
            if let Ok(mut m) = metrics.write() {
                m.reductions_scheduled += 1;
            }
        }

        info!(
            set = %job.dependency_set_id(),
            kind = %job.reduce_kind(),
            interval_secs = self.poll_interval.as_secs(),
            "reduction scheduled"
        );

        let jobs = self.jobs.clone();
        let metrics = self.metrics.clone();
        let tracker = self.tracker.clone();
        let driven = job.clone();
        let task = tokio::spawn(async move {
            let outcome = drive(&driven).await;
            jobs.write().await.remove(driven.dependency_set_id());
            if let Err(err) = tracker.release(driven.dependency_set_id()).await {
                warn!(set = %driven.dependency_set_id(), error = %err, "dependency set release failed");
            }
            if let Some(metrics) = metrics {
                if let Ok(mut m) = metrics.write() {
                    match outcome {
                        ReductionOutcome::Dispatched { .. } => m.reductions_dispatched += 1,
                        ReductionOutcome::Cancelled => m.reductions_cancelled += 1,
                        ReductionOutcome::Failed { .. } => m.reductions_failed += 1,
                    }
                }
            }
            outcome
        });

        Ok(ReductionHandle { job, task })
    }

    /// Cancel the live reduction of `dependency_set_id`, if any.
    pub async fn cancel(&self, dependency_set_id: &DependencySetId) -> bool {
        let job = self.jobs.read().await.get(dependency_set_id).cloned();
        job.map(|j| j.cancel()).unwrap_or(false)
    }

    /// Cancel every live reduction; returns how many were stopped.
    pub async fn cancel_all(&self) -> usize {
        let jobs: Vec<Arc<ReductionJob>> = self.jobs.read().await.values().cloned().collect();
        jobs.iter().filter(|j| j.cancel()).count()
    }

    /// Reductions not yet terminal.
    pub async fn active(&self) -> usize {
        self.jobs.read().await.len()
    }
}

async fn drive(job: &ReductionJob) -> ReductionOutcome {
    loop {
        match job.poll_once().await {
            Ok(PollOutcome::Dispatched(message_id)) => {
                return ReductionOutcome::Dispatched { message_id };
            }
            Ok(PollOutcome::Finished(_)) => {
                if let Some(outcome) = job.outcome() {
                    return outcome;
                }
            }
            Ok(PollOutcome::Waiting) | Ok(PollOutcome::Busy) => {}
            Err(err) => {
                if let Some(outcome) = job.outcome() {
                    return outcome;
                }
                warn!(set = %job.dependency_set_id(), error = %err, "reduction poll failed");
            }
        }
        job.wait_for_next_poll().await;
    }
}

/// Owner's view of a scheduled reduction.
pub struct ReductionHandle {
    job: Arc<ReductionJob>,
    task: JoinHandle<ReductionOutcome>,
}

impl ReductionHandle {
    pub fn job(&self) -> &Arc<ReductionJob> {
        &self.job
    }

    pub fn state(&self) -> JobState {
        self.job.state()
    }

    /// Cooperative: a job already dispatching or done is not stopped and
    /// this returns false.
    pub fn cancel(&self) -> bool {
        self.job.cancel()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome.
    pub async fn wait(self) -> ReductionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => ReductionOutcome::Failed {
                reason: format!("reduction task aborted: {err}"),
            },
        }
    }
}
