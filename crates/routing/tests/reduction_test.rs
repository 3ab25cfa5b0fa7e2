//! Reductions submitted through a real dispatcher.
//!
//! Timers run on tokio's paused clock so the 60 second poll interval costs
//! nothing.

use std::sync::Arc;
use std::time::Duration;

use marshal_core::{Config, DependencySetId, QueueName, TaskId, TaskKind};
use marshal_queue::InMemoryBroker;
use marshal_routing::{
    Dispatcher, InMemoryAttemptStore, InMemoryDependencyTracker, JobState, QueueCatalog,
    ReductionOutcome,
};

fn setup() -> (Arc<Dispatcher>, Arc<InMemoryBroker>, Arc<InMemoryDependencyTracker>) {
    let broker = Arc::new(InMemoryBroker::new());
    let dispatcher = Arc::new(Dispatcher::new(
        &Config::default(),
        Arc::new(QueueCatalog::builtin().unwrap()),
        broker.clone(),
        Arc::new(InMemoryAttemptStore::new()),
    )
    .unwrap());
    (dispatcher, broker, Arc::new(InMemoryDependencyTracker::new()))
}

#[tokio::test(start_paused = true)]
async fn reduce_task_goes_to_reducer_after_map_phase() {
    let (dispatcher, broker, tracker) = setup();
    let scheduler = dispatcher.reduction_scheduler(tracker.clone());
    assert_eq!(scheduler.poll_interval(), Duration::from_secs(60));

    let set = DependencySetId::from("video-42");
    let maps: Vec<TaskId> = (0..4).map(|i| TaskId::from(format!("map-{i}"))).collect();
    tracker.register(&set, maps.clone()).await;

    let handle = scheduler
        .schedule(set.clone(), TaskKind::from("perform_reduce"), serde_json::json!({"video": 42}))
        .await
        .unwrap();

    // Two intervals pass with work outstanding.
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(handle.state(), JobState::Polling);
    assert_eq!(handle.job().polls(), 3);
    assert_eq!(broker.depth(&QueueName::from("qreducer")).await, 0);

    for map in &maps {
        tracker.complete(&set, map).await;
    }

    let outcome = handle.wait().await;
    assert!(matches!(outcome, ReductionOutcome::Dispatched { .. }));

    let envelopes = broker.drain(&QueueName::from("qreducer")).await;
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].payload["dependency_set_id"], "video-42");
    assert_eq!(envelopes[0].payload["video"], 42);

    let metrics = dispatcher.metrics();
    assert_eq!(metrics.reductions_dispatched, 1);
    assert_eq!(metrics.submitted_by_queue[&QueueName::from("qreducer")], 1);
}

#[tokio::test(start_paused = true)]
async fn reduction_over_nothing_completes_immediately() {
    let (dispatcher, broker, tracker) = setup();
    let scheduler = dispatcher.reduction_scheduler(tracker);

    let handle = scheduler
        .schedule(
            DependencySetId::from("empty"),
            TaskKind::from("perform_reduce"),
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let outcome = handle.wait().await;
    assert!(matches!(outcome, ReductionOutcome::Dispatched { .. }));
    assert_eq!(broker.depth(&QueueName::from("qreducer")).await, 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_reduction_leaves_reducer_queue_empty() {
    let (dispatcher, broker, tracker) = setup();
    let scheduler = dispatcher.reduction_scheduler(tracker.clone());
    let set = DependencySetId::from("deleted-video");
    tracker.register(&set, [TaskId::from("map-0")]).await;

    let handle = scheduler
        .schedule(set.clone(), TaskKind::from("perform_reduce"), serde_json::json!({}))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(90)).await;

    assert!(handle.cancel());
    tracker.complete(&set, &TaskId::from("map-0")).await;
    assert_eq!(handle.wait().await, ReductionOutcome::Cancelled);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(broker.depth(&QueueName::from("qreducer")).await, 0);
    assert_eq!(dispatcher.metrics().reductions_cancelled, 1);
    assert_eq!(scheduler.active().await, 0);
}

#[tokio::test(start_paused = true)]
async fn unroutable_reduce_kind_fails_without_spinning() {
    let (dispatcher, broker, tracker) = setup();
    let scheduler = dispatcher.reduction_scheduler(tracker);

    let handle = scheduler
        .schedule(
            DependencySetId::from("bad"),
            TaskKind::from("perform_unknown_reduce"),
            serde_json::json!({}),
        )
        .await
        .unwrap();

    match handle.wait().await {
        ReductionOutcome::Failed { reason } => assert!(reason.contains("perform_unknown_reduce")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(broker.queue_names().await.is_empty());
    assert_eq!(dispatcher.metrics().reductions_failed, 1);
}
