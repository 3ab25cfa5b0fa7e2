use std::sync::Arc;

use marshal_core::{QueueName, ResourceId, TaskKind};

use super::*;
use crate::catalog::{QueueCatalog, QueueRole};
use crate::error::RoutingError;

fn catalog() -> Arc<QueueCatalog> {
    Arc::new(QueueCatalog::builtin().unwrap())
}

fn router(model: bool, retriever: bool) -> Router {
    Router::new(catalog(), ResourceQueueToggle::new(model, retriever))
}

// ── Static ──────────────────────────────────────────────────────────

#[test]
fn every_static_kind_resolves_to_a_catalog_queue() {
    let catalog = catalog();
    let router = StaticRouter::new(catalog.clone());
    for kind in catalog.table().static_routes.keys() {
        let queue = router.resolve(kind).unwrap();
        assert!(catalog.contains_queue(&queue), "{kind} -> {queue}");
    }
}

#[test]
fn static_examples() {
    let router = StaticRouter::new(catalog());
    let cases = [
        ("perform_reduce", "qreducer"),
        ("perform_video_decode", "qextract"),
        ("perform_stream_capture", "qstreamer"),
        ("perform_training", "qtrainer"),
        ("perform_video_decode_lambda", "qlambda"),
    ];
    for (kind, queue) in cases {
        assert_eq!(router.resolve(&TaskKind::from(kind)).unwrap(), QueueName::from(queue));
    }
}

#[test]
fn unknown_kind_is_rejected() {
    let router = StaticRouter::new(catalog());
    let err = router.resolve(&TaskKind::from("perform_magic")).unwrap_err();
    assert!(matches!(err, RoutingError::UnknownTaskKind(k) if k.as_str() == "perform_magic"));
}

#[test]
fn static_router_does_not_handle_dynamic_kinds() {
    let router = StaticRouter::new(catalog());
    assert!(router.resolve(&TaskKind::from("perform_indexing")).is_err());
}

// ── Dynamic ─────────────────────────────────────────────────────────

#[test]
fn toggle_on_gives_scoped_queue() {
    let router = DynamicResourceRouter::new(catalog());
    let toggle = ResourceQueueToggle::new(true, true);
    let route = router
        .resolve(&TaskKind::from("perform_indexing"), &ResourceId::from("m1"), &toggle)
        .unwrap();
    assert_eq!(route, ResourceRoute::Scoped(QueueName::from("qmodel-m1")));

    let route = router
        .resolve(&TaskKind::from("perform_retrieval"), &ResourceId::from("r7"), &toggle)
        .unwrap();
    assert_eq!(route, ResourceRoute::Scoped(QueueName::from("qretriever-r7")));
}

#[test]
fn scoped_queue_is_deterministic() {
    let router = DynamicResourceRouter::new(catalog());
    let toggle = ResourceQueueToggle::new(true, false);
    let kind = TaskKind::from("perform_detection");
    let id = ResourceId::from("detector_v2.1");
    let a = router.resolve(&kind, &id, &toggle).unwrap();
    let b = router.resolve(&kind, &id, &toggle).unwrap();
    assert_eq!(a, b);
}

#[test]
fn toggle_off_always_falls_back() {
    let router = DynamicResourceRouter::new(catalog());
    let toggle = ResourceQueueToggle::new(false, false);
    for id in ["m1", "m2", "some-other-model"] {
        let route = router
            .resolve(&TaskKind::from("perform_analysis"), &ResourceId::from(id), &toggle)
            .unwrap();
        assert_eq!(route, ResourceRoute::Fallback(QueueName::from("qglobal_model")));
    }
    let route = router
        .resolve(&TaskKind::from("perform_retrieval"), &ResourceId::from("r1"), &toggle)
        .unwrap();
    assert_eq!(route, ResourceRoute::Fallback(QueueName::from("qglobal_retriever")));
}

#[test]
fn toggles_are_independent_per_role() {
    let router = DynamicResourceRouter::new(catalog());
    let toggle = ResourceQueueToggle::new(true, false);
    let model = router
        .resolve(&TaskKind::from("perform_indexing"), &ResourceId::from("m1"), &toggle)
        .unwrap();
    let retriever = router
        .resolve(&TaskKind::from("perform_retrieval"), &ResourceId::from("r1"), &toggle)
        .unwrap();
    assert!(matches!(model, ResourceRoute::Scoped(_)));
    assert!(matches!(retriever, ResourceRoute::Fallback(_)));
}

#[test]
fn malformed_id_rejected_only_when_scoped() {
    let router = DynamicResourceRouter::new(catalog());
    let kind = TaskKind::from("perform_indexing");
    let too_long = "x".repeat(65);
    for bad in ["", "has space", "slash/inside", too_long.as_str()] {
        let id = ResourceId::from(bad);
        let err = router
            .resolve(&kind, &id, &ResourceQueueToggle::new(true, false))
            .unwrap_err();
        assert!(matches!(err, RoutingError::InvalidResourceId { .. }), "{bad:?}");

        let ok = router
            .resolve(&kind, &id, &ResourceQueueToggle::new(false, false))
            .unwrap();
        assert!(matches!(ok, ResourceRoute::Fallback(_)));
    }
}

#[test]
fn dynamic_router_rejects_static_kinds() {
    let router = DynamicResourceRouter::new(catalog());
    let err = router
        .resolve(
            &TaskKind::from("perform_reduce"),
            &ResourceId::from("m1"),
            &ResourceQueueToggle::new(true, true),
        )
        .unwrap_err();
    assert!(matches!(err, RoutingError::UnknownTaskKind(_)));
}

// ── Facade ──────────────────────────────────────────────────────────

#[test]
fn matching_with_model_toggle_off_goes_global() {
    let router = router(false, false);
    let route = router
        .resolve_queue(&TaskKind::from("perform_matching"), Some(&ResourceId::from("m1")))
        .unwrap();
    assert_eq!(route, Route::Fallback(QueueName::from("qglobal_model")));
    assert_eq!(route.path(), RoutePath::Fallback);
    assert!(route.is_dynamic());
}

#[test]
fn dynamic_kind_without_resource_id_is_rejected() {
    let router = router(true, true);
    let err = router
        .resolve_queue(&TaskKind::from("perform_indexing"), None)
        .unwrap_err();
    assert!(matches!(
        err,
        RoutingError::InvalidResourceId { resource_id: None, .. }
    ));
}

#[test]
fn static_kind_ignores_resource_id() {
    let router = router(true, true);
    let route = router
        .resolve_queue(&TaskKind::from("perform_export"), Some(&ResourceId::from("m1")))
        .unwrap();
    assert_eq!(route, Route::Static(QueueName::from("qextract")));
    assert!(!route.is_dynamic());
}

#[test]
fn fallback_queues_are_catalog_queues() {
    let catalog = catalog();
    let router = Router::new(catalog.clone(), ResourceQueueToggle::new(false, false));
    let model = router
        .resolve_queue(&TaskKind::from("perform_indexing"), Some(&ResourceId::from("m")))
        .unwrap();
    assert_eq!(model.queue(), catalog.queue(QueueRole::GlobalModel));
}

#[test]
fn toggle_defaults_follow_config_defaults() {
    let toggle = ResourceQueueToggle::default();
    assert!(toggle.model);
    assert!(!toggle.retriever);
}
