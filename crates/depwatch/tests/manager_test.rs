//! Integration tests for Manager registration, scheduling and shutdown

use depwatch::resolvers::{StaticResolver, resolver_fn};
use depwatch::{
    Dependency, DependencyConfig, DependencyGraph, Edge, Error, Manager, ManagerSlot,
    MetricsRegistry, ROOT,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Resolver that counts its calls and reports `healthy`
fn counting(calls: Arc<AtomicUsize>, healthy: Arc<AtomicBool>) -> impl depwatch::Resolver {
    resolver_fn(move || {
        let calls = calls.clone();
        let healthy = healthy.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            healthy.load(Ordering::SeqCst)
        }
    })
}

/// Let spawned check tasks run without moving past any interval
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn sorted_statuses(manager: &Manager) -> Vec<(String, bool)> {
    let mut list: Vec<(String, bool)> = manager
        .dependency_status_list()
        .into_iter()
        .map(|s| (s.name, s.healthy))
        .collect();
    list.sort();
    list
}

#[tokio::test(start_paused = true)]
async fn test_single_dependency_under_root() {
    let manager = Manager::new();
    let dep = Dependency::leaf("dep", StaticResolver::healthy(), Duration::ZERO);

    manager.register(None, [dep]).unwrap();
    settle().await;

    assert_eq!(manager.size(), 1);
    assert_eq!(manager.adjacency_list(), vec![Edge::new(ROOT, "dep")]);
    assert_eq!(sorted_statuses(&manager), vec![("dep".to_string(), true)]);
    assert_eq!(manager.status("dep"), Some(true));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cycle_registered_as_roots() {
    let graph = DependencyGraph::build([
        DependencyConfig::new("red", StaticResolver::healthy()).depends_on(["blue"]),
        DependencyConfig::new("blue", StaticResolver::healthy()).depends_on(["green"]),
        DependencyConfig::new("green", StaticResolver::healthy()).depends_on(["red"]),
    ])
    .unwrap();

    let manager = Manager::new();
    manager.register(None, graph.iter()).unwrap();
    settle().await;

    assert_eq!(manager.size(), 3);
    assert_eq!(manager.scheduled_checks(), 3);

    let edges = manager.adjacency_list();
    assert_eq!(edges.len(), 6);
    for (source, target) in [
        (ROOT, "red"),
        (ROOT, "blue"),
        (ROOT, "green"),
        ("red", "blue"),
        ("blue", "green"),
        ("green", "red"),
    ] {
        assert!(edges.contains(&Edge::new(source, target)), "missing {source} -> {target}");
    }

    assert_eq!(
        sorted_statuses(&manager),
        vec![
            ("blue".to_string(), true),
            ("green".to_string(), true),
            ("red".to_string(), true),
        ]
    );

    // Stable across reads and across registering the same roots again
    assert_eq!(manager.adjacency_list(), edges);
    manager.register(None, graph.iter()).unwrap();
    assert_eq!(manager.adjacency_list(), edges);
    assert_eq!(manager.size(), 3);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_children_registered_breadth_first() {
    let graph = DependencyGraph::build([
        DependencyConfig::new("api", StaticResolver::healthy()).depends_on(["db", "queue"]),
        DependencyConfig::new("db", StaticResolver::healthy()).depends_on(["disk"]),
        DependencyConfig::new("queue", StaticResolver::healthy()),
        DependencyConfig::new("disk", StaticResolver::healthy()),
    ])
    .unwrap();

    let manager = Manager::new();
    manager.register(None, graph.get("api")).unwrap();

    assert_eq!(
        manager.adjacency_list(),
        vec![
            Edge::new(ROOT, "api"),
            Edge::new("api", "db"),
            Edge::new("api", "queue"),
            Edge::new("db", "disk"),
        ]
    );
    assert_eq!(manager.size(), 4);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_child_propagates_to_parent_status() {
    let graph = DependencyGraph::build([
        DependencyConfig::new("api", StaticResolver::healthy()).depends_on(["db"]),
        DependencyConfig::new("db", StaticResolver::unhealthy()),
    ])
    .unwrap();

    let manager = Manager::new();
    manager.register(None, graph.get("api")).unwrap();
    settle().await;

    assert_eq!(manager.status("api"), Some(false));
    assert_eq!(manager.status("db"), Some(false));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeated_registration_is_idempotent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dep = Dependency::leaf(
        "dep",
        counting(calls.clone(), Arc::new(AtomicBool::new(true))),
        Duration::ZERO,
    );

    let manager = Manager::new();
    manager.register(None, [dep.clone()]).unwrap();
    manager.register(None, [dep.clone()]).unwrap();
    manager.register(None, [dep]).unwrap();
    settle().await;

    assert_eq!(manager.size(), 1);
    assert_eq!(manager.adjacency_list().len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_checks_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dep = Dependency::leaf(
        "dep",
        counting(calls.clone(), Arc::new(AtomicBool::new(true))),
        Duration::ZERO,
    );

    let manager = Manager::new();
    manager.register(None, [dep]).unwrap();
    tokio::time::sleep(Duration::from_secs(3600)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_recurring_checks_follow_interval() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dep = Dependency::leaf(
        "dep",
        counting(calls.clone(), Arc::new(AtomicBool::new(true))),
        Duration::from_secs(10),
    );

    let manager = Manager::new();
    manager.register(None, [dep]).unwrap();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_status_follows_resolver_changes() {
    common::logging::init_for_tests();

    let healthy = Arc::new(AtomicBool::new(true));
    let dep = Dependency::leaf(
        "dep",
        counting(Arc::new(AtomicUsize::new(0)), healthy.clone()),
        Duration::from_secs(5),
    );

    let manager = Manager::new();
    manager.register(None, [dep]).unwrap();
    settle().await;
    assert_eq!(manager.status("dep"), Some(true));

    healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(manager.status("dep"), Some(false));

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(manager.status("dep"), Some(true));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_checks_and_clears_state() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dep = Dependency::leaf(
        "dep",
        counting(calls.clone(), Arc::new(AtomicBool::new(true))),
        Duration::from_secs(1),
    );

    let manager = Manager::new();
    manager.register(None, [dep.clone()]).unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    manager.shutdown().await;
    let after_shutdown = calls.load(Ordering::SeqCst);

    assert_eq!(manager.size(), 0);
    assert_eq!(manager.scheduled_checks(), 0);
    assert!(manager.adjacency_list().is_empty());
    assert!(manager.dependency_status_list().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_shutdown);
    assert!(manager.dependency_status_list().is_empty());

    // The manager is usable again after shutdown
    manager.register(None, [dep]).unwrap();
    assert_eq!(manager.size(), 1);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_conflicting_name_is_rejected() {
    let manager = Manager::new();
    manager
        .register(None, [Dependency::leaf("db", StaticResolver::healthy(), Duration::ZERO)])
        .unwrap();

    let impostor = Dependency::leaf("db", StaticResolver::unhealthy(), Duration::ZERO);
    let err = manager.register(None, [impostor]).unwrap_err();

    assert!(matches!(err, Error::NameConflict(name) if name == "db"));
    assert_eq!(manager.size(), 1);
    settle().await;
    assert_eq!(manager.status("db"), Some(true));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_slot_resets_after_shutdown() {
    let metrics = Arc::new(MetricsRegistry::new());
    let slot = ManagerSlot::with_metrics(metrics.clone());

    let manager = slot.get();
    manager
        .register(None, [Dependency::leaf("dep", StaticResolver::healthy(), Duration::ZERO)])
        .unwrap();
    settle().await;
    assert!(slot.get().ptr_eq(&manager));
    assert!(metrics.encode().unwrap().contains("depwatch_checks_total"));

    slot.shutdown().await;
    let fresh = slot.get();
    assert!(!fresh.ptr_eq(&manager));
    assert_eq!(fresh.size(), 0);
    assert!(fresh.adjacency_list().is_empty());
}

fn leaves(prefix: &str, count: usize) -> Vec<Dependency> {
    (0..count)
        .map(|i| {
            Dependency::leaf(
                format!("{prefix}-{i}"),
                StaticResolver::healthy(),
                Duration::from_millis(5),
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_racing_registration_leaves_no_orphan_checks() {
    for round in 0..20 {
        let manager = Manager::new();
        manager.register(None, leaves("first", 25)).unwrap();

        let registering = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.register(None, leaves("second", 25)) })
        };
        manager.shutdown().await;
        registering.await.unwrap().unwrap();

        // Either the second batch landed before shutdown and was cleared, or
        // after it and is fully scheduled
        let size = manager.size();
        assert_eq!(size, manager.scheduled_checks(), "round {round}");
        assert!(size == 0 || size == 25, "round {round}: {size}");
        assert_eq!(manager.adjacency_list().len(), size, "round {round}");

        manager.shutdown().await;
        assert_eq!(manager.scheduled_checks(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.dependency_status_list().is_empty(), "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_conflicting_registrations_commit_one_side() {
    for round in 0..20 {
        let manager = Manager::new();
        let graph = DependencyGraph::build([
            DependencyConfig::new("api", StaticResolver::healthy()).depends_on(["db"]),
            DependencyConfig::new("db", StaticResolver::healthy()),
        ])
        .unwrap();
        let impostor = Dependency::leaf("db", StaticResolver::unhealthy(), Duration::ZERO);

        let with_api = {
            let manager = manager.clone();
            let api = graph.get("api");
            tokio::spawn(async move { manager.register(None, api) })
        };
        let alone = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.register(None, [impostor]) })
        };
        let with_api = with_api.await.unwrap();
        let alone = alone.await.unwrap();

        match (with_api, alone) {
            (Ok(()), Err(Error::NameConflict(name))) => {
                assert_eq!(name, "db");
                assert_eq!(
                    manager.adjacency_list(),
                    vec![Edge::new(ROOT, "api"), Edge::new("api", "db")],
                    "round {round}"
                );
                assert_eq!(manager.size(), 2);
            }
            (Err(Error::NameConflict(name)), Ok(())) => {
                assert_eq!(name, "db");
                assert_eq!(manager.adjacency_list(), vec![Edge::new(ROOT, "db")], "round {round}");
                assert!(!manager.is_registered("api"));
                assert_eq!(manager.size(), 1);
            }
            other => panic!("round {round}: exactly one registration must fail, got {other:?}"),
        }
        assert_eq!(manager.size(), manager.scheduled_checks());

        manager.shutdown().await;
    }
}
