use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use marshal_core::{QueueName, TaskKind};

use crate::batch::BatchUnit;
use crate::classify::TaskCategorySet;

// ── Roles ───────────────────────────────────────────────────────────

/// Semantic role of a catalog queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueRole {
    Manager,
    Reducer,
    Extractor,
    Streamer,
    Trainer,
    Lambda,
    GlobalModel,
    GlobalRetriever,
}

impl QueueRole {
    pub const ALL: [QueueRole; 8] = [
        QueueRole::Manager,
        QueueRole::Reducer,
        QueueRole::Extractor,
        QueueRole::Streamer,
        QueueRole::Trainer,
        QueueRole::Lambda,
        QueueRole::GlobalModel,
        QueueRole::GlobalRetriever,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueRole::Manager => "manager",
            QueueRole::Reducer => "reducer",
            QueueRole::Extractor => "extractor",
            QueueRole::Streamer => "streamer",
            QueueRole::Trainer => "trainer",
            QueueRole::Lambda => "lambda",
            QueueRole::GlobalModel => "global_model",
            QueueRole::GlobalRetriever => "global_retriever",
        }
    }
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of resource that may own a dedicated queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRole {
    Model,
    Retriever,
}

impl ResourceRole {
    /// Shared queue used when per-resource queues are disabled for this role.
    pub fn fallback_role(&self) -> QueueRole {
        match self {
            ResourceRole::Model => QueueRole::GlobalModel,
            ResourceRole::Retriever => QueueRole::GlobalRetriever,
        }
    }

    pub const ALL: [ResourceRole; 2] = [ResourceRole::Model, ResourceRole::Retriever];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceRole::Model => "model",
            ResourceRole::Retriever => "retriever",
        }
    }
}

impl fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw TOML table ──────────────────────────────────────────────────

/// Routing table as written in TOML, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingTable {
    /// Role name (`manager`, `global_model`, ...) to queue name.
    #[serde(default)]
    pub queues: BTreeMap<String, QueueName>,

    /// Resource role name (`model`, `retriever`) to naming rule.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceQueues>,

    #[serde(default)]
    pub static_routes: BTreeMap<TaskKind, QueueRole>,

    #[serde(default)]
    pub dynamic_routes: BTreeMap<TaskKind, ResourceRole>,

    #[serde(default)]
    pub categories: CategoryTable,

    #[serde(default)]
    pub batching: BatchingTable,
}

/// Naming rule for one resource role's dedicated queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceQueues {
    /// Scoped queues are named `<prefix>-<resource id>`.
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryTable {
    #[serde(default)]
    pub restartable: BTreeSet<TaskKind>,
    #[serde(default)]
    pub training: BTreeSet<TaskKind>,
    #[serde(default)]
    pub non_processing: BTreeSet<TaskKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchingTable {
    #[serde(default)]
    pub segments: BTreeSet<TaskKind>,
    #[serde(default)]
    pub frames: BTreeSet<TaskKind>,
}

// ── Validated catalog ───────────────────────────────────────────────

/// Immutable, validated queue topology.
///
/// Built once at process start and shared as `Arc<QueueCatalog>`; there is
/// no mutation path, so lookups need no locking.
#[derive(Debug, Clone)]
pub struct QueueCatalog {
    pub(super) queues: BTreeMap<QueueRole, QueueName>,
    pub(super) resources: BTreeMap<ResourceRole, ResourceQueues>,
    pub(super) static_routes: HashMap<TaskKind, QueueRole>,
    pub(super) dynamic_routes: HashMap<TaskKind, ResourceRole>,
    pub(super) categories: HashMap<TaskKind, TaskCategorySet>,
    pub(super) batch_units: HashMap<TaskKind, BatchUnit>,
    /// Source table, kept for fingerprinting and display.
    pub(super) table: RoutingTable,
}

impl QueueCatalog {
    /// Queue name bound to a role.
    pub fn queue(&self, role: QueueRole) -> &QueueName {
        // Validation guarantees every role is bound.
        &self.queues[&role]
    }

    /// Whether `name` is one of the fixed catalog queues.
    pub fn contains_queue(&self, name: &QueueName) -> bool {
        self.queues.values().any(|q| q == name)
    }

    pub fn queues(&self) -> impl Iterator<Item = (QueueRole, &QueueName)> {
        self.queues.iter().map(|(role, name)| (*role, name))
    }

    pub fn static_role(&self, kind: &TaskKind) -> Option<QueueRole> {
        self.static_routes.get(kind).copied()
    }

    pub fn resource_role(&self, kind: &TaskKind) -> Option<ResourceRole> {
        self.dynamic_routes.get(kind).copied()
    }

    pub fn resource_prefix(&self, role: ResourceRole) -> &str {
        &self.resources[&role].prefix
    }

    pub fn categories(&self, kind: &TaskKind) -> TaskCategorySet {
        self.categories.get(kind).copied().unwrap_or_default()
    }

    pub fn batch_unit(&self, kind: &TaskKind) -> Option<BatchUnit> {
        self.batch_units.get(kind).copied()
    }

    /// Every kind with a route, static first then dynamic, each sorted.
    pub fn routable_kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.table.static_routes.keys().cloned().collect();
        kinds.extend(self.table.dynamic_routes.keys().cloned());
        kinds
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }
}
