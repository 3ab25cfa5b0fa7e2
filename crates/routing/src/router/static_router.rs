use std::sync::Arc;

use marshal_core::{QueueName, TaskKind};

use crate::catalog::QueueCatalog;
use crate::error::RoutingError;

/// Resolves a task kind to its fixed catalog queue.
///
/// Pure lookup over the immutable catalog; safe to call from any number of
/// producers concurrently.
#[derive(Debug, Clone)]
pub struct StaticRouter {
    catalog: Arc<QueueCatalog>,
}

impl StaticRouter {
    pub fn new(catalog: Arc<QueueCatalog>) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, kind: &TaskKind) -> Result<QueueName, RoutingError> {
        self.catalog
            .static_role(kind)
            .map(|role| self.catalog.queue(role).clone())
            .ok_or_else(|| RoutingError::UnknownTaskKind(kind.clone()))
    }

    pub fn handles(&self, kind: &TaskKind) -> bool {
        self.catalog.static_role(kind).is_some()
    }
}
