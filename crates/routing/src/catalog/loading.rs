use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use marshal_core::config::RoutingConfig;

use super::types::{QueueCatalog, RoutingTable};
use crate::error::RoutingError;
use crate::router::ResourceQueueToggle;

/// Routing table compiled into the binary.
pub const BUILTIN_TABLE: &str = include_str!("../../config/routing.toml");

impl QueueCatalog {
    /// Parse and validate a catalog from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RoutingError> {
        let table: RoutingTable = toml::from_str(toml_str)?;
        Self::from_table(table)
    }

    /// Load a catalog from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RoutingError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, RoutingError> {
        Self::from_toml(BUILTIN_TABLE)
    }

    /// Load the operator's table when `ROUTING_TABLE_PATH` is set, else the builtin one.
    pub fn from_config(config: &RoutingConfig) -> Result<Self, RoutingError> {
        let catalog = match &config.table_path {
            Some(path) => Self::from_file(path)?,
            None => Self::builtin()?,
        };
        info!(
            source = %config.table_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "builtin".into()),
            static_routes = catalog.static_routes.len(),
            dynamic_routes = catalog.dynamic_routes.len(),
            "routing catalog loaded"
        );
        Ok(catalog)
    }

    /// Deterministic SHA-256 over the canonical table and the resource toggles.
    ///
    /// Two processes with different fingerprints will route at least one
    /// task kind differently.
    pub fn fingerprint(&self, toggle: &ResourceQueueToggle) -> String {
        let mut lines = Vec::new();
        for (role, queue) in &self.queues {
            lines.push(format!("queue {role}={queue}"));
        }
        for (role, rq) in &self.resources {
            lines.push(format!("resource {role}={}", rq.prefix));
        }
        for (kind, role) in &self.table.static_routes {
            lines.push(format!("static {kind}={role}"));
        }
        for (kind, role) in &self.table.dynamic_routes {
            lines.push(format!("dynamic {kind}={role}"));
        }
        lines.push(format!("toggle model={} retriever={}", toggle.model, toggle.retriever));

        let digest = Sha256::digest(lines.join("\n").as_bytes());
        format!("{digest:x}")
    }
}
