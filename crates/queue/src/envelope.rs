//! Wire envelope carried by every dispatched task.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marshal_core::{QueueName, ResourceId, TaskId, TaskKind};

/// Current envelope schema version.
pub const ENVELOPE_VERSION: u16 = 1;

/// Opaque id assigned by the broker to an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON envelope submitted to a queue.
///
/// The broker holds it durably until a worker acknowledges completion, so a
/// worker may see the same envelope more than once. `attempt` lets it tell a
/// redelivery from an explicit retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Queue the router resolved; recorded for dead-letter inspection.
    pub queue: QueueName,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    pub attempt: u32,
    pub submitted_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_version() -> u16 {
    ENVELOPE_VERSION
}

impl TaskEnvelope {
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        queue: QueueName,
        payload: serde_json::Value,
        resource_id: Option<ResourceId>,
        attempt: u32,
    ) -> Self {
        Self {
            id,
            kind,
            queue,
            payload,
            resource_id,
            attempt,
            submitted_at: Utc::now(),
            version: ENVELOPE_VERSION,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}
