use serde::{Deserialize, Serialize};

use marshal_core::{QueueName, ResourceId, TaskId, TaskKind};
use marshal_queue::TaskEnvelope;

/// A submitted unit of work.
///
/// `attempt` is rewritten by [`RetryPolicy::admit`](crate::retry::RetryPolicy::admit)
/// from the attempt store; callers never bump it themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: TaskId,
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl TaskInstance {
    pub fn new(kind: impl Into<TaskKind>, payload: serde_json::Value, max_attempts: u32) -> Self {
        Self {
            id: TaskId::generate(),
            kind: kind.into(),
            payload,
            resource_id: None,
            attempt: 0,
            max_attempts,
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<ResourceId>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Wire form for `queue` at the current attempt.
    pub fn to_envelope(&self, queue: QueueName) -> TaskEnvelope {
        TaskEnvelope::new(
            self.id.clone(),
            self.kind.clone(),
            queue,
            self.payload.clone(),
            self.resource_id.clone(),
            self.attempt,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_starts_at_attempt_zero() {
        let task = TaskInstance::new("perform_export", serde_json::json!({"id": 3}), 5);
        assert_eq!(task.attempt, 0);
        assert_eq!(task.max_attempts, 5);
        assert!(task.resource_id.is_none());
        assert!(!task.id.as_str().is_empty());
    }

    #[test]
    fn envelope_carries_resource_and_attempt() {
        let mut task = TaskInstance::new("perform_indexing", serde_json::json!({}), 5)
            .with_id("t-9")
            .with_resource("m1");
        task.attempt = 2;
        let env = task.to_envelope(QueueName::from("qmodel-m1"));
        assert_eq!(env.id, TaskId::from("t-9"));
        assert_eq!(env.resource_id, Some(ResourceId::from("m1")));
        assert_eq!(env.attempt, 2);
        assert_eq!(env.queue.as_str(), "qmodel-m1");
    }
}
