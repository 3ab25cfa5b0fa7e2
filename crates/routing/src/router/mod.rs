//! Queue resolution.
//!
//! Kinds with a fixed destination go through [`StaticRouter`]; kinds scoped
//! to a model or retriever go through [`DynamicResourceRouter`]. [`Router`]
//! picks the right one for producers that only know the kind.

mod dynamic;
mod static_router;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use marshal_core::{QueueName, ResourceId, TaskKind};

use crate::catalog::QueueCatalog;
use crate::error::RoutingError;

pub use dynamic::{DynamicResourceRouter, ResourceQueueToggle, ResourceRoute};
pub use static_router::StaticRouter;

/// A resolved destination and the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Static(QueueName),
    Scoped(QueueName),
    Fallback(QueueName),
}

/// Which resolution path a route took, for metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    Static,
    Scoped,
    Fallback,
}

impl Route {
    pub fn queue(&self) -> &QueueName {
        match self {
            Route::Static(q) | Route::Scoped(q) | Route::Fallback(q) => q,
        }
    }

    pub fn into_queue(self) -> QueueName {
        match self {
            Route::Static(q) | Route::Scoped(q) | Route::Fallback(q) => q,
        }
    }

    pub fn path(&self) -> RoutePath {
        match self {
            Route::Static(_) => RoutePath::Static,
            Route::Scoped(_) => RoutePath::Scoped,
            Route::Fallback(_) => RoutePath::Fallback,
        }
    }

    /// Scoped and fallback routes depend on the resource toggles.
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Route::Static(_))
    }
}

impl From<ResourceRoute> for Route {
    fn from(route: ResourceRoute) -> Self {
        match route {
            ResourceRoute::Scoped(q) => Route::Scoped(q),
            ResourceRoute::Fallback(q) => Route::Fallback(q),
        }
    }
}

impl std::fmt::Display for RoutePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RoutePath::Static => "static",
            RoutePath::Scoped => "scoped",
            RoutePath::Fallback => "fallback",
        })
    }
}

/// Facade over the static and dynamic routers with the toggles fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct Router {
    static_router: StaticRouter,
    dynamic: DynamicResourceRouter,
    toggle: ResourceQueueToggle,
}

impl Router {
    pub fn new(catalog: Arc<QueueCatalog>, toggle: ResourceQueueToggle) -> Self {
        Self {
            static_router: StaticRouter::new(catalog.clone()),
            dynamic: DynamicResourceRouter::new(catalog),
            toggle,
        }
    }

    pub fn toggle(&self) -> ResourceQueueToggle {
        self.toggle
    }

    pub fn static_router(&self) -> &StaticRouter {
        &self.static_router
    }

    pub fn dynamic_router(&self) -> &DynamicResourceRouter {
        &self.dynamic
    }

    /// Resolve the destination queue for `kind`.
    ///
    /// Resource-scoped kinds require `resource_id`. Static kinds ignore it.
    pub fn resolve_queue(
        &self,
        kind: &TaskKind,
        resource_id: Option<&ResourceId>,
    ) -> Result<Route, RoutingError> {
        if self.dynamic.handles(kind) {
            let resource_id = resource_id.ok_or_else(|| RoutingError::InvalidResourceId {
                kind: kind.clone(),
                resource_id: None,
            })?;
            let route: Route = self.dynamic.resolve(kind, resource_id, &self.toggle)?.into();
            debug!(kind = %kind, resource_id = %resource_id, queue = %route.queue(), path = %route.path(), "resolved route");
            return Ok(route);
        }

        let queue = self.static_router.resolve(kind)?;
        if let Some(id) = resource_id {
            debug!(kind = %kind, resource_id = %id, "resource id ignored for static kind");
        }
        debug!(kind = %kind, queue = %queue, path = "static", "resolved route");
        Ok(Route::Static(queue))
    }
}
