//! Bounded retry and crash recovery.
//!
//! Attempt counting lives in an [`AttemptStore`]; the policy only decides
//! what a count means. Recovery after an interruption depends on the kind's
//! `Restartable` category: anything else is surfaced to the caller so
//! non-idempotent work (training, deletion, export) is never duplicated.

mod store;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use marshal_core::config::{DeploymentConfig, RetryConfig};
use marshal_core::{TaskId, TaskKind};

use crate::classify::TaskClassifier;
use crate::error::RoutingError;
use crate::task::TaskInstance;

pub use store::{AttemptOutcome, AttemptStore, InMemoryAttemptStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Dispatch { attempt: u32 },
    /// Terminal. The task must be reported as permanently failed.
    Exhausted { attempts: u32 },
}

/// Why an interrupted task was not resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    /// The orchestrator moved the worker.
    Rescheduled,
    /// The worker process died.
    Crashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "recovery", rename_all = "snake_case")]
pub enum Recovery {
    Resubmit,
    Surface { reason: InterruptReason },
}

pub struct RetryPolicy {
    store: Arc<dyn AttemptStore>,
    classifier: TaskClassifier,
    max_attempts: u32,
    orchestrated: bool,
}

impl RetryPolicy {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        classifier: TaskClassifier,
        retry: &RetryConfig,
        deployment: &DeploymentConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            max_attempts: retry.max_attempts,
            orchestrated: deployment.orchestrated,
        }
    }

    /// Budget given to new instances.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// A fresh instance with this policy's budget.
    pub fn instance(&self, kind: impl Into<TaskKind>, payload: serde_json::Value) -> TaskInstance {
        TaskInstance::new(kind, payload, self.max_attempts)
    }

    /// Count one submission of `instance` and decide whether it may go out.
    ///
    /// On `Dispatch` the instance's `attempt` is updated to the number the
    /// store assigned.
    pub async fn admit(&self, instance: &mut TaskInstance) -> Result<Decision, RoutingError> {
        match self.store.begin_attempt(&instance.id, instance.max_attempts).await? {
            AttemptOutcome::Admitted(attempt) => {
                instance.attempt = attempt;
                debug!(task_id = %instance.id, kind = %instance.kind, attempt, "attempt admitted");
                Ok(Decision::Dispatch { attempt })
            }
            AttemptOutcome::Exhausted(attempts) => {
                warn!(
                    task_id = %instance.id,
                    kind = %instance.kind,
                    attempts,
                    "task exhausted its attempt budget"
                );
                Ok(Decision::Exhausted { attempts })
            }
        }
    }

    /// Drop the counter of a task that finished successfully.
    pub async fn complete(&self, task_id: &TaskId) -> Result<(), RoutingError> {
        self.store.clear(task_id).await
    }

    pub fn is_restartable(&self, kind: &TaskKind) -> bool {
        self.classifier.is_restartable(kind)
    }

    /// What to do with a task that was in flight when its worker went away.
    pub fn on_interrupted(&self, instance: &TaskInstance) -> Recovery {
        if self.is_restartable(&instance.kind) {
            return Recovery::Resubmit;
        }
        let reason = if self.orchestrated {
            InterruptReason::Rescheduled
        } else {
            InterruptReason::Crashed
        };
        Recovery::Surface { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QueueCatalog;

    fn policy(max_attempts: u32, orchestrated: bool) -> RetryPolicy {
        let catalog = Arc::new(QueueCatalog::builtin().unwrap());
        RetryPolicy::new(
            Arc::new(InMemoryAttemptStore::new()),
            TaskClassifier::new(catalog),
            &RetryConfig { max_attempts },
            &DeploymentConfig { orchestrated },
        )
    }

    #[tokio::test]
    async fn first_admission_dispatches_attempt_zero() {
        let p = policy(5, false);
        let mut task = p.instance("perform_export", serde_json::json!({}));
        assert_eq!(p.admit(&mut task).await.unwrap(), Decision::Dispatch { attempt: 0 });
        assert_eq!(task.attempt, 0);
    }

    #[tokio::test]
    async fn never_dispatches_more_than_budget() {
        let p = policy(5, false);
        let mut task = p.instance("perform_export", serde_json::json!({}));
        let mut dispatched = 0;
        for _ in 0..10 {
            if let Decision::Dispatch { .. } = p.admit(&mut task).await.unwrap() {
                dispatched += 1;
            }
        }
        assert_eq!(dispatched, 5);
        assert_eq!(task.attempt, 4);
        assert_eq!(p.admit(&mut task).await.unwrap(), Decision::Exhausted { attempts: 5 });
    }

    #[tokio::test]
    async fn training_third_submission_still_dispatches() {
        let p = policy(5, false);
        let mut task = p.instance("perform_training", serde_json::json!({}));
        p.admit(&mut task).await.unwrap();
        p.admit(&mut task).await.unwrap();
        assert_eq!(p.admit(&mut task).await.unwrap(), Decision::Dispatch { attempt: 2 });
        assert!(!p.is_restartable(&task.kind));
    }

    #[tokio::test]
    async fn complete_resets_budget() {
        let p = policy(1, false);
        let mut task = p.instance("perform_sync", serde_json::json!({}));
        p.admit(&mut task).await.unwrap();
        assert!(matches!(p.admit(&mut task).await.unwrap(), Decision::Exhausted { .. }));
        p.complete(&task.id).await.unwrap();
        assert_eq!(p.admit(&mut task).await.unwrap(), Decision::Dispatch { attempt: 0 });
    }

    #[tokio::test]
    async fn concurrent_admissions_respect_budget() {
        let p = Arc::new(policy(3, false));
        let task = p.instance("perform_export", serde_json::json!({}));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let p = p.clone();
            let mut task = task.clone();
            handles.push(tokio::spawn(async move { p.admit(&mut task).await.unwrap() }));
        }
        let mut dispatched = 0;
        for h in handles {
            if matches!(h.await.unwrap(), Decision::Dispatch { .. }) {
                dispatched += 1;
            }
        }
        assert_eq!(dispatched, 3);
    }

    #[test]
    fn restartable_kinds_are_resubmitted() {
        let p = policy(5, false);
        let task = p.instance("perform_video_decode", serde_json::json!({}));
        assert_eq!(p.on_interrupted(&task), Recovery::Resubmit);
    }

    #[test]
    fn non_restartable_kinds_surface() {
        let task = TaskInstance::new("perform_deletion", serde_json::json!({}), 5);
        assert_eq!(
            policy(5, false).on_interrupted(&task),
            Recovery::Surface { reason: InterruptReason::Crashed }
        );
        assert_eq!(
            policy(5, true).on_interrupted(&task),
            Recovery::Surface { reason: InterruptReason::Rescheduled }
        );
    }

    #[test]
    fn decision_serializes_tagged() {
        let json = serde_json::to_value(Decision::Exhausted { attempts: 5 }).unwrap();
        assert_eq!(json["decision"], "exhausted");
        assert_eq!(json["attempts"], 5);
    }
}
