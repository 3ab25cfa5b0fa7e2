use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use marshal_core::{DependencySetId, TaskId};

use crate::error::RoutingError;

/// Completion view over the map sub-tasks of a reduction.
#[async_trait]
pub trait DependencyTracker: Send + Sync {
    /// True once every member of the set has completed. A set with no
    /// members is complete.
    async fn all_completed(&self, set: &DependencySetId) -> Result<bool, RoutingError>;

    /// The reduction over `set` is terminal; drop whatever is kept for it.
    async fn release(&self, _set: &DependencySetId) -> Result<(), RoutingError> {
        Ok(())
    }
}

/// Tracker that keeps outstanding members in memory.
#[derive(Debug, Default)]
pub struct InMemoryDependencyTracker {
    outstanding: RwLock<HashMap<DependencySetId, HashSet<TaskId>>>,
}

impl InMemoryDependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add map sub-tasks to `set`.
    pub async fn register(&self, set: &DependencySetId, members: impl IntoIterator<Item = TaskId>) {
        let mut members = members.into_iter().peekable();
        if members.peek().is_none() {
            return;
        }
        self.outstanding
            .write()
            .await
            .entry(set.clone())
            .or_default()
            .extend(members);
    }

    /// Mark one member done. Returns false if it was not outstanding.
    ///
    /// A set is dropped once its last member completes.
    pub async fn complete(&self, set: &DependencySetId, member: &TaskId) -> bool {
        let mut outstanding = self.outstanding.write().await;
        let Some(members) = outstanding.get_mut(set) else {
            return false;
        };
        let removed = members.remove(member);
        if members.is_empty() {
            outstanding.remove(set);
        }
        removed
    }

    /// Drop a set whatever its state, e.g. after its reduction was cancelled.
    pub async fn forget(&self, set: &DependencySetId) -> bool {
        self.outstanding.write().await.remove(set).is_some()
    }

    /// Sets with at least one outstanding member.
    pub async fn set_count(&self) -> usize {
        self.outstanding.read().await.len()
    }

    pub async fn outstanding(&self, set: &DependencySetId) -> usize {
        self.outstanding.read().await.get(set).map(HashSet::len).unwrap_or(0)
    }
}

#[async_trait]
impl DependencyTracker for InMemoryDependencyTracker {
    async fn all_completed(&self, set: &DependencySetId) -> Result<bool, RoutingError> {
        Ok(self.outstanding(set).await == 0)
    }

    async fn release(&self, set: &DependencySetId) -> Result<(), RoutingError> {
        self.forget(set).await;
        Ok(())
    }
}
