use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use marshal_core::{DependencySetId, TaskId, TaskKind};
use marshal_queue::MessageId;

use super::tracker::DependencyTracker;
use crate::error::RoutingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobState {
    Pending = 0,
    Polling = 1,
    Dispatching = 2,
    Done = 3,
    Cancelled = 4,
    /// The reduce task could not be submitted and will not be retried.
    Failed = 5,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Pending,
            1 => JobState::Polling,
            2 => JobState::Dispatching,
            3 => JobState::Done,
            4 => JobState::Cancelled,
            _ => JobState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Cancelled | JobState::Failed)
    }
}

/// Submits a job's reduce task once its dependencies complete.
#[async_trait]
pub trait ReduceSubmitter: Send + Sync {
    async fn submit_reduce(&self, job: &ReductionJob) -> Result<MessageId, RoutingError>;

    /// Called once after the job reaches `Done`, to release per-task state
    /// such as the reduce task's attempt counter.
    async fn reduce_dispatched(&self, _job: &ReductionJob) -> Result<(), RoutingError> {
        Ok(())
    }
}

/// Terminal result of a reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReductionOutcome {
    Dispatched { message_id: MessageId },
    Cancelled,
    Failed { reason: String },
}

/// Result of a single [`ReductionJob::poll_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another poll of this job is in progress.
    Busy,
    /// Dependencies are still outstanding.
    Waiting,
    /// This poll submitted the reduce task.
    Dispatched(MessageId),
    /// Nothing left to do; the job is in this state.
    Finished(JobState),
}

/// A reduce task waiting on a set of map sub-tasks.
///
/// State moves `Pending -> Polling -> Dispatching -> Done`, or to
/// `Cancelled` from `Pending`/`Polling`. Every move is a compare-and-swap,
/// so the reduce task is submitted at most once per successful dispatch no
/// matter how many pollers race.
pub struct ReductionJob {
    reduce_kind: TaskKind,
    dependency_set_id: DependencySetId,
    /// Stable across resubmissions so the attempt store counts them.
    reduce_task_id: TaskId,
    payload: serde_json::Value,
    poll_interval: Duration,
    created_at: DateTime<Utc>,
    state: AtomicU8,
    polls: AtomicU32,
    poll_lock: Mutex<()>,
    wake: Notify,
    message_id: OnceLock<MessageId>,
    failure: OnceLock<String>,
    tracker: Arc<dyn DependencyTracker>,
    submitter: Arc<dyn ReduceSubmitter>,
}

impl ReductionJob {
    pub fn new(
        dependency_set_id: DependencySetId,
        reduce_kind: TaskKind,
        payload: serde_json::Value,
        poll_interval: Duration,
        tracker: Arc<dyn DependencyTracker>,
        submitter: Arc<dyn ReduceSubmitter>,
    ) -> Self {
        Self {
            reduce_kind,
            dependency_set_id,
            reduce_task_id: TaskId::generate(),
            payload,
            poll_interval,
            created_at: Utc::now(),
            state: AtomicU8::new(JobState::Pending as u8),
            polls: AtomicU32::new(0),
            poll_lock: Mutex::new(()),
            wake: Notify::new(),
            message_id: OnceLock::new(),
            failure: OnceLock::new(),
            tracker,
            submitter,
        }
    }

    pub fn reduce_kind(&self) -> &TaskKind {
        &self.reduce_kind
    }

    pub fn dependency_set_id(&self) -> &DependencySetId {
        &self.dependency_set_id
    }

    pub fn reduce_task_id(&self) -> &TaskId {
        &self.reduce_task_id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Polls that reached the dependency tracker.
    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::Relaxed)
    }

    fn transition(&self, from: JobState, to: JobState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Check dependencies once and dispatch the reduce task if they are done.
    ///
    /// Polls of the same job never overlap; a caller that finds one in
    /// progress gets [`PollOutcome::Busy`] without waiting.
    pub async fn poll_once(&self) -> Result<PollOutcome, RoutingError> {
        let Ok(_guard) = self.poll_lock.try_lock() else {
            return Ok(PollOutcome::Busy);
        };

        if !self.transition(JobState::Pending, JobState::Polling) {
            let state = self.state();
            if state != JobState::Polling {
                return Ok(PollOutcome::Finished(state));
            }
        }

        let poll = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.tracker.all_completed(&self.dependency_set_id).await? {
            debug!(set = %self.dependency_set_id, poll, "dependencies outstanding");
            return Ok(PollOutcome::Waiting);
        }

        // Cancellation may have landed while the tracker was queried.
        if !self.transition(JobState::Polling, JobState::Dispatching) {
            return Ok(PollOutcome::Finished(self.state()));
        }

        match self.submitter.submit_reduce(self).await {
            Ok(message_id) => {
                let _ = self.message_id.set(message_id.clone());
                self.set_state(JobState::Done);
                info!(
                    set = %self.dependency_set_id,
                    kind = %self.reduce_kind,
                    message_id = %message_id,
                    poll,
                    "reduce task dispatched"
                );
                if let Err(err) = self.submitter.reduce_dispatched(self).await {
                    warn!(set = %self.dependency_set_id, error = %err, "reduce dispatch cleanup failed");
                }
                Ok(PollOutcome::Dispatched(message_id))
            }
            Err(err) if is_transient(&err) => {
                self.set_state(JobState::Polling);
                warn!(set = %self.dependency_set_id, error = %err, "reduce dispatch failed, will retry on next poll");
                Err(err)
            }
            Err(err) => {
                let _ = self.failure.set(err.to_string());
                self.set_state(JobState::Failed);
                warn!(set = %self.dependency_set_id, error = %err, "reduce dispatch failed permanently");
                Err(err)
            }
        }
    }

    /// Stop a job that has not started dispatching. Returns whether the job
    /// is now cancelled.
    pub fn cancel(&self) -> bool {
        loop {
            let current = self.state();
            match current {
                JobState::Pending | JobState::Polling => {
                    if self.transition(current, JobState::Cancelled) {
                        self.wake.notify_one();
                        info!(set = %self.dependency_set_id, "reduction cancelled");
                        return true;
                    }
                }
                JobState::Cancelled => return true,
                JobState::Dispatching | JobState::Done | JobState::Failed => return false,
            }
        }
    }

    /// Terminal outcome, if the job has reached one.
    pub fn outcome(&self) -> Option<ReductionOutcome> {
        match self.state() {
            JobState::Done => self
                .message_id
                .get()
                .cloned()
                .map(|message_id| ReductionOutcome::Dispatched { message_id }),
            JobState::Cancelled => Some(ReductionOutcome::Cancelled),
            JobState::Failed => Some(ReductionOutcome::Failed {
                reason: self.failure.get().cloned().unwrap_or_default(),
            }),
            JobState::Pending | JobState::Polling | JobState::Dispatching => None,
        }
    }

    /// Sleep one interval, or less if the job is cancelled meanwhile.
    pub(super) async fn wait_for_next_poll(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = self.wake.notified() => {}
        }
    }
}

/// Broker and tracker hiccups are retried on the next poll; anything else
/// will fail the same way every time.
fn is_transient(err: &RoutingError) -> bool {
    matches!(
        err,
        RoutingError::Queue(_) | RoutingError::Tracker(_) | RoutingError::StaleToggleMismatch { .. }
    )
}
