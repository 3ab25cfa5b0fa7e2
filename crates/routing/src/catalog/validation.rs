use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use marshal_core::{QueueName, TaskKind};

use super::types::{QueueCatalog, QueueRole, ResourceQueues, ResourceRole, RoutingTable};
use crate::batch::BatchUnit;
use crate::classify::{TaskCategory, TaskCategorySet};
use crate::error::RoutingError;

fn catalog_err(msg: String) -> RoutingError {
    RoutingError::Catalog(msg)
}

fn is_queue_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl QueueCatalog {
    /// Validate a raw table and freeze it into a catalog.
    pub fn from_table(table: RoutingTable) -> Result<Self, RoutingError> {
        let queues = validate_queues(&table)?;
        let resources = validate_resources(&table, &queues)?;
        validate_route_overlap(&table)?;
        validate_dynamic_roles(&table, &resources)?;

        let categories = build_categories(&table);
        let batch_units = build_batch_units(&table)?;

        Ok(Self {
            queues,
            resources,
            static_routes: table.static_routes.iter().map(|(k, r)| (k.clone(), *r)).collect(),
            dynamic_routes: table.dynamic_routes.iter().map(|(k, r)| (k.clone(), *r)).collect(),
            categories,
            batch_units,
            table,
        })
    }
}

/// Every role must be bound exactly once, to a distinct queue name.
fn validate_queues(table: &RoutingTable) -> Result<BTreeMap<QueueRole, QueueName>, RoutingError> {
    let mut queues = BTreeMap::new();
    let mut seen: HashMap<&QueueName, QueueRole> = HashMap::new();

    for (role_name, queue) in &table.queues {
        let role = QueueRole::parse(role_name)
            .ok_or_else(|| catalog_err(format!("unknown queue role '{role_name}'")))?;
        if !is_queue_token(queue.as_str()) {
            return Err(catalog_err(format!("queue name '{queue}' for role '{role}' is not valid")));
        }
        if let Some(other) = seen.insert(queue, role) {
            return Err(catalog_err(format!(
                "queue '{queue}' is bound to both '{other}' and '{role}'"
            )));
        }
        queues.insert(role, queue.clone());
    }

    let missing: Vec<&str> = QueueRole::ALL
        .iter()
        .filter(|role| !queues.contains_key(role))
        .map(|role| role.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(catalog_err(format!("missing queue roles: {}", missing.join(", "))));
    }

    Ok(queues)
}

/// Resource prefixes must be valid queue tokens that can never collide with
/// a fixed catalog queue.
fn validate_resources(
    table: &RoutingTable,
    queues: &BTreeMap<QueueRole, QueueName>,
) -> Result<BTreeMap<ResourceRole, ResourceQueues>, RoutingError> {
    let mut resources = BTreeMap::new();
    for (role_name, rq) in &table.resources {
        let role = ResourceRole::parse(role_name)
            .ok_or_else(|| catalog_err(format!("unknown resource role '{role_name}'")))?;
        if !is_queue_token(&rq.prefix) {
            return Err(catalog_err(format!("resource role '{role}' has an invalid prefix '{}'", rq.prefix)));
        }
        if queues.values().any(|q| q.as_str() == rq.prefix) {
            return Err(catalog_err(format!(
                "resource prefix '{}' collides with a catalog queue",
                rq.prefix
            )));
        }
        resources.insert(role, rq.clone());
    }

    let mut prefixes = HashSet::new();
    for rq in resources.values() {
        if !prefixes.insert(rq.prefix.as_str()) {
            return Err(catalog_err(format!("resource prefix '{}' is used twice", rq.prefix)));
        }
    }

    Ok(resources)
}

/// A kind must have exactly one way to resolve.
fn validate_route_overlap(table: &RoutingTable) -> Result<(), RoutingError> {
    for kind in table.static_routes.keys() {
        if table.dynamic_routes.contains_key(kind) {
            return Err(catalog_err(format!(
                "task kind '{kind}' has both a static and a dynamic route"
            )));
        }
    }
    Ok(())
}

fn validate_dynamic_roles(
    table: &RoutingTable,
    resources: &BTreeMap<ResourceRole, ResourceQueues>,
) -> Result<(), RoutingError> {
    for (kind, role) in &table.dynamic_routes {
        if !resources.contains_key(role) {
            return Err(catalog_err(format!(
                "task kind '{kind}' routes to resource role '{role}' which has no [resources.{role}] entry"
            )));
        }
    }
    Ok(())
}

fn build_categories(table: &RoutingTable) -> HashMap<TaskKind, TaskCategorySet> {
    let mut categories: HashMap<TaskKind, TaskCategorySet> = HashMap::new();
    let groups = [
        (TaskCategory::Restartable, &table.categories.restartable),
        (TaskCategory::Training, &table.categories.training),
        (TaskCategory::NonProcessing, &table.categories.non_processing),
    ];
    for (category, kinds) in groups {
        for kind in kinds {
            if !table.static_routes.contains_key(kind) && !table.dynamic_routes.contains_key(kind) {
                debug!(kind = %kind, category = ?category, "category lists a kind with no route");
            }
            categories.entry(kind.clone()).or_default().insert(category);
        }
    }
    categories
}

/// Batch units are consulted by producers before dispatch, so every listed
/// kind must be routable and belong to exactly one unit.
fn build_batch_units(table: &RoutingTable) -> Result<HashMap<TaskKind, BatchUnit>, RoutingError> {
    let mut units = HashMap::new();
    let groups = [
        (BatchUnit::Segments, &table.batching.segments),
        (BatchUnit::Frames, &table.batching.frames),
    ];
    for (unit, kinds) in groups {
        for kind in kinds {
            if !table.static_routes.contains_key(kind) && !table.dynamic_routes.contains_key(kind) {
                return Err(catalog_err(format!("batching lists '{kind}' which has no route")));
            }
            if units.insert(kind.clone(), unit).is_some() {
                return Err(catalog_err(format!("task kind '{kind}' is listed under two batch units")));
            }
        }
    }
    Ok(units)
}
