//! Subcommand handlers. Each one builds the same components a producer
//! would and prints what they decide.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use marshal_core::{Config, QueueName, ResourceId, TaskKind};
use marshal_queue::{InMemoryBroker, SqsBroker, TaskBroker};
use marshal_routing::{
    BatchPlanner, Dispatcher, InMemoryAttemptStore, QueueCatalog, ResourceQueueToggle, ResourceRole,
    Router,
};

use crate::cli::{CliArgs, Command};

pub async fn run(args: CliArgs, config: Config) -> Result<()> {
    let catalog = Arc::new(
        QueueCatalog::from_config(&config.routing).context("failed to load routing table")?,
    );
    let json = args.json;

    match args.command {
        Command::Resolve { kind, resource } => resolve(&config, catalog, &kind, resource, json),
        Command::Plan { kind, total, list } => plan(&config, catalog, &kind, total, list, json),
        Command::Sampling { rate } => sampling(&config, catalog, rate, json),
        Command::Catalog => show_catalog(&config, &catalog, json),
        Command::Config => print_json(&config.redacted_summary()),
        Command::Submit { kind, resource, payload } => {
            submit(&config, catalog, &kind, resource, &payload, json).await
        }
        Command::Health { queues } => health(&config, &catalog, queues, json).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn resolve(
    config: &Config,
    catalog: Arc<QueueCatalog>,
    kind: &str,
    resource: Option<String>,
    json: bool,
) -> Result<()> {
    let router = Router::new(catalog.clone(), ResourceQueueToggle::from_config(&config.routing));
    let kind = TaskKind::from(kind);
    let resource = resource.map(ResourceId::from);
    let route = router.resolve_queue(&kind, resource.as_ref())?;
    let categories = catalog.categories(&kind);

    if json {
        return print_json(&json!({
            "kind": kind,
            "resource_id": resource,
            "queue": route.queue(),
            "path": route.path(),
            "categories": categories,
        }));
    }

    println!("{kind} -> {} ({})", route.queue(), route.path());
    let labels: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
    if !labels.is_empty() {
        println!("categories: {}", labels.join(", "));
    }
    Ok(())
}

fn plan(
    config: &Config,
    catalog: Arc<QueueCatalog>,
    kind: &str,
    total: u64,
    list: bool,
    json: bool,
) -> Result<()> {
    let planner = BatchPlanner::new(catalog, config.batch.clone());
    let plan = planner.plan(total, &TaskKind::from(kind))?;

    if json {
        let batches: Vec<_> = if list { plan.batches().collect() } else { Vec::new() };
        return print_json(&json!({ "plan": plan, "batches": batches }));
    }

    println!(
        "{kind}: {} {} in {} batches of up to {}",
        plan.unit_count, plan.unit, plan.batch_count, plan.unit_size
    );
    if let Some(n) = plan.sample_every_nth {
        println!("sampling: every {n} frames plus key frames");
    }
    if list {
        for batch in plan.batches() {
            println!("  #{:<5} [{}, {})  {}", batch.index, batch.start, batch.end(), batch.len);
        }
    }
    Ok(())
}

fn sampling(config: &Config, catalog: Arc<QueueCatalog>, rate: Option<u32>, json: bool) -> Result<()> {
    let planner = BatchPlanner::new(catalog, config.batch.clone());
    let plan = planner.sampling_rate(rate.unwrap_or(config.batch.sampling_rate))?;
    if json {
        return print_json(&plan);
    }
    println!(
        "every {} frames, key frames {}",
        plan.every_nth,
        if plan.include_key_frames { "included" } else { "excluded" }
    );
    Ok(())
}

fn show_catalog(config: &Config, catalog: &QueueCatalog, json: bool) -> Result<()> {
    let toggle = ResourceQueueToggle::from_config(&config.routing);
    let fingerprint = catalog.fingerprint(&toggle);
    let source = config
        .routing
        .table_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "builtin".into());

    if json {
        return print_json(&json!({
            "source": source,
            "fingerprint": fingerprint,
            "toggle": toggle,
            "table": catalog.table(),
        }));
    }

    println!("routing table: {source}");
    println!(
        "fingerprint:   {fingerprint} (model queues {}, retriever queues {})",
        on_off(toggle.model),
        on_off(toggle.retriever)
    );

    println!("\nqueues:");
    for (role, queue) in catalog.queues() {
        println!("  {:<18} {queue}", role.as_str());
    }

    println!("\nstatic routes:");
    for (kind, role) in &catalog.table().static_routes {
        println!("  {kind:<32} {}", catalog.queue(*role));
    }

    println!("\ndynamic routes:");
    for (kind, role) in &catalog.table().dynamic_routes {
        let target = if toggle.enabled(*role) {
            format!("{}-<id>", catalog.resource_prefix(*role))
        } else {
            catalog.queue(role.fallback_role()).to_string()
        };
        println!("  {kind:<32} {target}");
    }

    for role in ResourceRole::ALL {
        if !toggle.enabled(role) {
            continue;
        }
        println!(
            "\nworkers serving {role} resources must drain {}-<id>",
            catalog.resource_prefix(role)
        );
    }
    Ok(())
}

async fn build_broker(config: &Config) -> Result<Arc<dyn TaskBroker>> {
    match config.queue.broker.as_str() {
        "sqs" => {
            let broker = SqsBroker::new(&config.aws, &config.queue)
                .await
                .context("failed to create SQS broker")?;
            Ok(Arc::new(broker))
        }
        "memory" => {
            warn!("using the in-memory broker; submitted tasks are dropped when this process exits");
            Ok(Arc::new(InMemoryBroker::new()))
        }
        other => bail!("unsupported broker '{other}'"),
    }
}

async fn submit(
    config: &Config,
    catalog: Arc<QueueCatalog>,
    kind: &str,
    resource: Option<String>,
    payload: &str,
    json: bool,
) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("payload is not valid JSON")?;
    let broker = build_broker(config).await?;
    let dispatcher = Dispatcher::new(config, catalog, broker, Arc::new(InMemoryAttemptStore::new()))?;

    let mut instance = dispatcher.instance(kind, payload);
    if let Some(id) = resource {
        instance = instance.with_resource(id);
    }
    let submission = dispatcher.submit(instance).await?;

    if json {
        return print_json(&submission);
    }
    println!(
        "submitted {} to {} ({}) as {}",
        submission.task_id, submission.queue, submission.path, submission.message_id
    );
    Ok(())
}

async fn health(config: &Config, catalog: &QueueCatalog, queues: Vec<String>, json: bool) -> Result<()> {
    let broker = build_broker(config).await?;
    let queues: Vec<QueueName> = if queues.is_empty() {
        catalog.queues().map(|(_, q)| q.clone()).collect()
    } else {
        queues.into_iter().map(QueueName::from).collect()
    };

    let mut report = Vec::new();
    let mut failures = 0;
    for queue in queues {
        match broker.health_check(&queue).await {
            Ok(health) => {
                if !json {
                    println!("  {queue:<24} {health}");
                }
                report.push(json!({ "queue": queue, "health": health }));
            }
            Err(e) => {
                failures += 1;
                if !json {
                    println!("  {queue:<24} error: {e}");
                }
                report.push(json!({ "queue": queue, "error": e.to_string() }));
            }
        }
    }

    if json {
        print_json(&report)?;
    }
    if failures > 0 {
        bail!("{failures} queue(s) unreachable on {}", broker.provider());
    }
    Ok(())
}
