//! Static classification of task kinds into overlapping categories.
//!
//! Categories are independent hints: retry logic reads `Restartable`,
//! progress accounting reads `NonProcessing` and `Training`. A kind may be
//! in any combination of them.

use std::sync::Arc;

use serde::Serialize;

use marshal_core::TaskKind;

use crate::catalog::QueueCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Safe to re-execute automatically after an interruption.
    Restartable,
    /// Produces a trained model or training set.
    Training,
    /// Does not process media frames; excluded from processing progress.
    NonProcessing,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Restartable => "restartable",
            TaskCategory::Training => "training",
            TaskCategory::NonProcessing => "non_processing",
        }
    }

    fn bit(self) -> u8 {
        match self {
            TaskCategory::Restartable => 0b001,
            TaskCategory::Training => 0b010,
            TaskCategory::NonProcessing => 0b100,
        }
    }
}

/// Set of categories a kind belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TaskCategorySet(u8);

impl TaskCategorySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, category: TaskCategory) {
        self.0 |= category.bit();
    }

    pub fn with(mut self, category: TaskCategory) -> Self {
        self.insert(category);
        self
    }

    pub fn contains(&self, category: TaskCategory) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskCategory> + '_ {
        [TaskCategory::Restartable, TaskCategory::Training, TaskCategory::NonProcessing]
            .into_iter()
            .filter(|c| self.contains(*c))
    }
}

impl Serialize for TaskCategorySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Read-only lookups over the catalog's category lists.
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    catalog: Arc<QueueCatalog>,
}

impl TaskClassifier {
    pub fn new(catalog: Arc<QueueCatalog>) -> Self {
        Self { catalog }
    }

    pub fn categories(&self, kind: &TaskKind) -> TaskCategorySet {
        self.catalog.categories(kind)
    }

    pub fn is_restartable(&self, kind: &TaskKind) -> bool {
        self.categories(kind).contains(TaskCategory::Restartable)
    }

    pub fn is_training(&self, kind: &TaskKind) -> bool {
        self.categories(kind).contains(TaskCategory::Training)
    }

    pub fn is_non_processing(&self, kind: &TaskKind) -> bool {
        self.categories(kind).contains(TaskCategory::NonProcessing)
    }
}
