//! Identifiers shared by every marshal crate.
//!
//! All of them are thin string newtypes so they serialize transparently
//! into broker envelopes and TOML tables.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Name of a unit-of-work type, e.g. `perform_video_decode`.
    TaskKind
);

string_id!(
    /// Destination queue consumed by a homogeneous worker pool.
    QueueName
);

string_id!(
    /// Identifier of a model or retriever instance that may own a dedicated queue.
    ResourceId
);

string_id!(
    /// Identifier of the set of map sub-tasks a reduction waits on.
    DependencySetId
);

string_id!(
    /// Identifier of one submitted task instance.
    TaskId
);

/// Longest resource id accepted for queue synthesis.
pub const MAX_RESOURCE_ID_LEN: usize = 64;

impl ResourceId {
    /// A resource id can be embedded in a queue name only when it is non-empty,
    /// bounded, and limited to `[A-Za-z0-9_.-]`.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_RESOURCE_ID_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }
}

impl TaskId {
    /// Fresh random task id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
