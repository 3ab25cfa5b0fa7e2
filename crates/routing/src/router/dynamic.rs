use std::sync::Arc;

use serde::Serialize;

use marshal_core::config::RoutingConfig;
use marshal_core::{QueueName, ResourceId, TaskKind};

use crate::catalog::{QueueCatalog, ResourceRole};
use crate::error::RoutingError;

/// Fleet-wide switches for per-resource queues.
///
/// Read once at startup and never changed. A producer and a worker with
/// different values will stall silently: one side publishes to a queue the
/// other never drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceQueueToggle {
    pub model: bool,
    pub retriever: bool,
}

impl ResourceQueueToggle {
    pub fn new(model: bool, retriever: bool) -> Self {
        Self { model, retriever }
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            model: config.per_model_queues,
            retriever: config.per_retriever_queues,
        }
    }

    pub fn enabled(&self, role: ResourceRole) -> bool {
        match role {
            ResourceRole::Model => self.model,
            ResourceRole::Retriever => self.retriever,
        }
    }
}

impl Default for ResourceQueueToggle {
    fn default() -> Self {
        Self::from_config(&RoutingConfig::default())
    }
}

/// Which path a resource-scoped kind took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRoute {
    /// Dedicated `<prefix>-<resource id>` queue.
    Scoped(QueueName),
    /// Role's global queue; per-resource queues are disabled.
    Fallback(QueueName),
}

impl ResourceRoute {
    pub fn queue(&self) -> &QueueName {
        match self {
            ResourceRoute::Scoped(q) | ResourceRoute::Fallback(q) => q,
        }
    }
}

/// Resolves kinds scoped to a model or retriever instance.
#[derive(Debug, Clone)]
pub struct DynamicResourceRouter {
    catalog: Arc<QueueCatalog>,
}

impl DynamicResourceRouter {
    pub fn new(catalog: Arc<QueueCatalog>) -> Self {
        Self { catalog }
    }

    pub fn handles(&self, kind: &TaskKind) -> bool {
        self.catalog.resource_role(kind).is_some()
    }

    /// Resolve `kind` for `resource_id` under `toggle`.
    ///
    /// The same resource id always yields the same scoped queue. A malformed
    /// id is rejected only on the scoped path; the fallback queue does not
    /// embed it.
    pub fn resolve(
        &self,
        kind: &TaskKind,
        resource_id: &ResourceId,
        toggle: &ResourceQueueToggle,
    ) -> Result<ResourceRoute, RoutingError> {
        let role = self
            .catalog
            .resource_role(kind)
            .ok_or_else(|| RoutingError::UnknownTaskKind(kind.clone()))?;

        if !toggle.enabled(role) {
            let queue = self.catalog.queue(role.fallback_role()).clone();
            return Ok(ResourceRoute::Fallback(queue));
        }

        if !resource_id.is_well_formed() {
            return Err(RoutingError::InvalidResourceId {
                kind: kind.clone(),
                resource_id: Some(resource_id.clone()),
            });
        }

        Ok(ResourceRoute::Scoped(self.scoped_queue(role, resource_id)))
    }

    /// `<prefix>-<resource id>` for the role.
    pub fn scoped_queue(&self, role: ResourceRole, resource_id: &ResourceId) -> QueueName {
        QueueName::new(format!("{}-{}", self.catalog.resource_prefix(role), resource_id))
    }
}
