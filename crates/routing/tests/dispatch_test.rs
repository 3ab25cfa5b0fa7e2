//! End-to-end dispatch through the in-memory broker.
//!
//! Covers the producer path: catalog, router, retry budget, listener
//! enforcement and crash recovery, all wired by `Dispatcher::new`.

use std::sync::Arc;

use marshal_core::{Config, DependencySetId, QueueName, ResourceId, TaskKind};
use marshal_queue::InMemoryBroker;
use marshal_routing::{
    Decision, Dispatcher, InMemoryAttemptStore, InMemoryDependencyTracker, InterruptReason,
    ListenerRegistry, QueueCatalog, ReductionOutcome, Route, RoutePath, RoutingError,
};

fn config(per_model: bool, per_retriever: bool) -> Config {
    let mut config = Config::default();
    config.routing.per_model_queues = per_model;
    config.routing.per_retriever_queues = per_retriever;
    config
}

fn setup(config: &Config) -> (Dispatcher, Arc<InMemoryBroker>) {
    let broker = Arc::new(InMemoryBroker::new());
    let dispatcher = Dispatcher::new(
        config,
        Arc::new(QueueCatalog::builtin().unwrap()),
        broker.clone(),
        Arc::new(InMemoryAttemptStore::new()),
    )
    .unwrap();
    (dispatcher, broker)
}

#[tokio::test]
async fn matching_with_model_queues_off_lands_on_global_queue() {
    let (d, broker) = setup(&config(false, false));
    let task = d
        .instance("perform_matching", serde_json::json!({"query": 12}))
        .with_resource("m1");

    let submission = d.submit(task).await.unwrap();
    assert_eq!(submission.queue.as_str(), "qglobal_model");
    assert_eq!(submission.path, RoutePath::Fallback);

    assert_eq!(broker.depth(&QueueName::from("qglobal_model")).await, 1);
    assert_eq!(broker.depth(&QueueName::from("qmodel-m1")).await, 0);
    let envelope = broker.pop(&QueueName::from("qglobal_model")).await.unwrap();
    assert_eq!(envelope.resource_id, Some(ResourceId::from("m1")));
}

#[tokio::test]
async fn model_queues_on_give_scoped_queue() {
    let (d, broker) = setup(&config(true, false));
    for _ in 0..3 {
        let task = d
            .instance("perform_indexing", serde_json::json!({}))
            .with_resource("clip");
        d.submit(task).await.unwrap();
    }
    assert_eq!(broker.queue_names().await, vec![QueueName::from("qmodel-clip")]);
    assert_eq!(broker.depth(&QueueName::from("qmodel-clip")).await, 3);

    let metrics = d.metrics();
    assert_eq!(metrics.routes_scoped, 3);
    assert_eq!(metrics.submitted_by_queue[&QueueName::from("qmodel-clip")], 3);
}

#[tokio::test]
async fn routing_errors_fail_before_the_broker() {
    let (d, broker) = setup(&config(true, true));

    let unknown = d.instance("perform_magic", serde_json::json!({}));
    assert!(matches!(
        d.submit(unknown).await,
        Err(RoutingError::UnknownTaskKind(_))
    ));

    let missing_id = d.instance("perform_retrieval", serde_json::json!({}));
    assert!(matches!(
        d.submit(missing_id).await,
        Err(RoutingError::InvalidResourceId { .. })
    ));

    let bad_id = d
        .instance("perform_retrieval", serde_json::json!({}))
        .with_resource("no spaces allowed");
    assert!(matches!(
        d.submit(bad_id).await,
        Err(RoutingError::InvalidResourceId { .. })
    ));

    assert!(broker.queue_names().await.is_empty());
}

#[tokio::test]
async fn training_dispatches_on_third_submission_and_is_not_restartable() {
    let (d, broker) = setup(&Config::default());
    let mut task = d.instance("perform_training", serde_json::json!({"model": "yolo"}));

    assert_eq!(d.admit_retry(&mut task).await.unwrap(), Decision::Dispatch { attempt: 0 });
    assert_eq!(d.admit_retry(&mut task).await.unwrap(), Decision::Dispatch { attempt: 1 });

    let submission = d.submit(task.clone()).await.unwrap();
    assert_eq!(submission.attempt, 2);
    assert_eq!(submission.queue.as_str(), "qtrainer");
    assert!(!d.retry_policy().is_restartable(&task.kind));
    assert_eq!(broker.depth(&QueueName::from("qtrainer")).await, 1);
}

#[tokio::test]
async fn budget_is_enforced_across_submissions() {
    let (d, broker) = setup(&Config::default());
    let task = d.instance("perform_export", serde_json::json!({}));

    for _ in 0..5 {
        d.submit(task.clone()).await.unwrap();
    }
    let err = d.submit(task.clone()).await.unwrap_err();
    assert!(matches!(err, RoutingError::AttemptsExhausted { attempts: 5, .. }));
    assert_eq!(broker.depth(&QueueName::from("qextract")).await, 5);
    assert_eq!(d.metrics().exhausted, 1);
}

#[tokio::test]
async fn stale_toggle_detected_when_enforced() {
    let mut cfg = config(true, false);
    cfg.routing.enforce_listeners = true;
    let (d, broker) = setup(&cfg);

    // Workers still run with per-model queues off and only drain the global queue.
    d.listeners()
        .announce("worker-1", [QueueName::from("qglobal_model")])
        .await;

    let task = d
        .instance("perform_detection", serde_json::json!({}))
        .with_resource("m1");
    let err = d.submit(task).await.unwrap_err();
    assert!(matches!(err, RoutingError::StaleToggleMismatch { ref queue } if queue.as_str() == "qmodel-m1"));
    assert_eq!(d.metrics().stale_mismatches, 1);
    assert!(broker.queue_names().await.is_empty());

    // Static kinds are never checked.
    let static_task = d.instance("perform_sync", serde_json::json!({}));
    assert!(d.submit(static_task).await.is_ok());
}

#[tokio::test]
async fn shared_listener_registry_unblocks_dispatch() {
    let mut cfg = config(true, false);
    cfg.routing.enforce_listeners = true;
    let registry = Arc::new(ListenerRegistry::from_config(&cfg.routing));
    let (d, _broker) = setup(&cfg);
    let d = d.with_listeners(registry.clone());

    registry.announce("worker-m1", [QueueName::from("qmodel-m1")]).await;
    let task = d
        .instance("perform_analysis", serde_json::json!({}))
        .with_resource("m1");
    assert_eq!(d.submit(task).await.unwrap().queue.as_str(), "qmodel-m1");
}

#[tokio::test]
async fn recovery_resubmits_only_restartable_kinds() {
    let mut cfg = Config::default();
    cfg.deployment.orchestrated = true;
    let (d, broker) = setup(&cfg);

    let decode = d.instance("perform_video_decode", serde_json::json!({"segment": 3}));
    let training = d.instance("perform_training", serde_json::json!({}));
    let deletion = d.instance("perform_deletion", serde_json::json!({}));

    let report = d
        .recover_interrupted(vec![decode.clone(), training.clone(), deletion.clone()])
        .await;

    assert_eq!(report.resubmitted.len(), 1);
    assert_eq!(report.resubmitted[0].task_id, decode.id);
    assert_eq!(
        report.surfaced,
        vec![
            (training.id, InterruptReason::Rescheduled),
            (deletion.id, InterruptReason::Rescheduled),
        ]
    );
    assert!(report.exhausted.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(broker.depth(&QueueName::from("qextract")).await, 1);
    assert_eq!(broker.depth(&QueueName::from("qtrainer")).await, 0);
}

#[tokio::test]
async fn resolve_queue_matches_submit() {
    let (d, _) = setup(&config(true, true));
    let route = d
        .resolve_queue(&TaskKind::from("perform_retrieval"), Some(&ResourceId::from("r7")))
        .unwrap();
    assert_eq!(route, Route::Scoped(QueueName::from("qretriever-r7")));
}

#[tokio::test]
async fn one_failed_resubmission_does_not_abort_recovery() {
    let (d, broker) = setup(&config(true, false));

    let decode = d.instance("perform_video_decode", serde_json::json!({}));
    // Restartable, but a model-scoped kind with no resource id cannot route.
    let indexing = d.instance("perform_indexing", serde_json::json!({}));
    let deletion = d.instance("perform_deletion", serde_json::json!({}));

    let report = d
        .recover_interrupted(vec![decode.clone(), indexing.clone(), deletion.clone()])
        .await;

    assert_eq!(report.resubmitted.len(), 1);
    assert_eq!(report.resubmitted[0].task_id, decode.id);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, indexing.id);
    assert!(report.failed[0].1.contains("perform_indexing"));
    assert_eq!(report.surfaced, vec![(deletion.id, InterruptReason::Crashed)]);
    assert_eq!(broker.depth(&QueueName::from("qextract")).await, 1);
}

fn setup_with_store(config: &Config) -> (Arc<Dispatcher>, Arc<InMemoryAttemptStore>) {
    let store = Arc::new(InMemoryAttemptStore::new());
    let dispatcher = Dispatcher::new(
        config,
        Arc::new(QueueCatalog::builtin().unwrap()),
        Arc::new(InMemoryBroker::new()),
        store.clone(),
    )
    .unwrap();
    (Arc::new(dispatcher), store)
}

#[tokio::test]
async fn completed_tasks_release_their_attempt_counters() {
    let (d, store) = setup_with_store(&Config::default());

    let mut ids = Vec::new();
    for i in 0..1000 {
        let task = d.instance("perform_video_decode", serde_json::json!({"segment": i}));
        ids.push(d.submit(task).await.unwrap().task_id);
    }
    assert_eq!(store.len().await, 1000);

    for id in &ids {
        d.complete(id).await.unwrap();
    }
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn dispatched_reduction_releases_its_attempt_counter() {
    let (d, store) = setup_with_store(&Config::default());
    let tracker = Arc::new(InMemoryDependencyTracker::new());
    let scheduler = d.reduction_scheduler(tracker);

    let handle = scheduler
        .schedule(
            DependencySetId::from("video-7"),
            TaskKind::from("perform_reduce"),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    assert!(matches!(handle.wait().await, ReductionOutcome::Dispatched { .. }));
    assert_eq!(store.len().await, 0);
}
