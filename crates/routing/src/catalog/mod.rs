//! Queue catalog: the fixed set of named queues, their roles, and the
//! static and dynamic routing table that maps task kinds onto them.
//!
//! Split into focused submodules:
//! - `types`: roles, raw TOML table, and the validated [`QueueCatalog`]
//! - `validation`: startup checks that turn a table into a catalog
//! - `loading`: builtin/TOML/file loading and fleet fingerprinting

mod loading;
mod types;
mod validation;

pub use loading::BUILTIN_TABLE;
pub use types::{
    BatchingTable, CategoryTable, QueueCatalog, QueueRole, ResourceQueues, ResourceRole,
    RoutingTable,
};
