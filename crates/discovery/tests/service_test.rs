use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use cluster_discovery::{
    ClusterDiscovery, ClusterIdentity, DiscoveryConfig, DiscoveryError, DiscoveryService,
    HealthFilter, InstanceRecord, MemberEntry, NodeAddress, ServiceState, SettingsError,
};
use cluster_discovery_mock::MockRegistry;
use tracing_test::traced_test;

const NAMESPACE: &str = "cluster.local";

fn identity() -> ClusterIdentity {
    ClusterIdentity::new("akka.tcp", "sys")
}

fn config(services: &[&str]) -> DiscoveryConfig {
    DiscoveryConfig::new("local", NAMESPACE, services.iter().copied())
}

fn address(instance: &str, service: &str, port: u16) -> NodeAddress {
    NodeAddress::new("akka.tcp", "sys", format!("{instance}.{service}.{NAMESPACE}"), port)
}

async fn start(
    registry: &MockRegistry,
    config: DiscoveryConfig,
) -> DiscoveryService<MockRegistry> {
    let service = DiscoveryService::from_config(config, identity(), registry.clone())
        .await
        .unwrap();
    // Wait for the initial membership snapshot, then drop its queries.
    service.subscribe().changed().await.unwrap();
    registry.clear_queries();
    service
}

#[tokio::test]
async fn test_interval_violation_prevents_start() {
    let registry = MockRegistry::new();
    let mut config = config(&["seed"]);
    config.alive_interval = Duration::from_secs(10);
    config.alive_timeout = Duration::from_secs(20);
    config.service_check_ttl = Some(Duration::from_secs(30));

    let result = DiscoveryService::from_config(config, identity(), registry.clone()).await;

    assert!(matches!(
        result,
        Err(DiscoveryError::Settings(SettingsError::IntervalOrdering { .. }))
    ));
    assert_eq!(registry.clients_created(), 0);
}

#[tokio::test]
async fn test_client_creation_failure_prevents_start() {
    let registry = MockRegistry::new();
    registry.fail_client_creation(true);

    let result = DiscoveryService::from_config(config(&["seed"]), identity(), registry).await;

    assert!(matches!(result, Err(DiscoveryError::ClientCreation(_))));
}

#[tokio::test]
#[traced_test]
async fn test_get_nodes_queries_each_service_once_healthy_only() {
    let registry = MockRegistry::new();
    registry.add_service(NAMESPACE, "seed");
    registry.add_service(NAMESPACE, "worker");
    let service = start(&registry, config(&["seed", "worker"])).await;

    service.get_nodes(true).await.unwrap();

    let mut queries = registry.queries();
    queries.sort_by(|a, b| a.query.service_name.cmp(&b.query.service_name));
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].query.service_name, "seed");
    assert_eq!(queries[1].query.service_name, "worker");
    for recorded in &queries {
        assert_eq!(recorded.query.health_filter, HealthFilter::HealthyOnly);
        assert_eq!(recorded.query.namespace, NAMESPACE);
    }

    registry.clear_queries();
    service.get_nodes(false).await.unwrap();
    assert!(
        registry
            .queries()
            .iter()
            .all(|q| q.query.health_filter == HealthFilter::All)
    );

    service.shutdown().await;
}

#[tokio::test]
async fn test_only_alive_excludes_unhealthy_instances() {
    let registry = MockRegistry::new();
    registry.register(InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552), true);
    registry.register(InstanceRecord::with_port("i-2", "seed", NAMESPACE, 2552), false);
    let service = start(&registry, config(&["seed"])).await;

    assert_eq!(service.get_nodes(true).await.unwrap().len(), 1);
    assert_eq!(service.get_nodes(false).await.unwrap().len(), 2);

    service.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn test_failing_service_is_isolated() {
    let registry = MockRegistry::new();
    registry.fail_service(NAMESPACE, "down", "connection reset");
    registry.register(InstanceRecord::with_port("i-1", "up", NAMESPACE, 2552), true);
    registry.register(InstanceRecord::with_port("i-2", "up", NAMESPACE, 2553), true);
    registry.register(InstanceRecord::with_port("i-3", "up", NAMESPACE, 2554), true);
    let service = start(&registry, config(&["down", "up"])).await;

    let nodes = service.get_nodes(true).await.unwrap();

    let expected = [
        address("i-1", "up", 2552),
        address("i-2", "up", 2553),
        address("i-3", "up", 2554),
    ]
    .into_iter()
    .collect();
    assert_eq!(nodes, expected);

    let report = service.poll(true).await.unwrap();
    assert_eq!(report.failed_queries, 1);

    service.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn test_record_without_port_is_dropped() {
    let registry = MockRegistry::new();
    let mut no_port = InstanceRecord::with_port("i-2", "seed", NAMESPACE, 0);
    no_port.attributes.clear();
    registry.register(InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552), true);
    registry.register(no_port, true);
    registry.register(InstanceRecord::with_port("i-3", "seed", NAMESPACE, "http"), true);
    let service = start(&registry, config(&["seed"])).await;

    let report = service.poll(true).await.unwrap();

    assert_eq!(report.dropped_records, 2);
    assert_eq!(
        report.membership,
        [address("i-1", "seed", 2552)].into_iter().collect()
    );

    service.shutdown().await;
}

#[tokio::test]
async fn test_repeated_polls_are_set_equal_and_deduplicated() {
    let registry = MockRegistry::new();
    let record = InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552);
    registry.register(record.clone(), true);
    registry.register(record, true);
    registry.register(InstanceRecord::with_port("i-2", "seed", NAMESPACE, 2552), true);
    let service = start(&registry, config(&["seed", "seed"])).await;

    let first = service.get_nodes(true).await.unwrap();
    let second = service.get_nodes(true).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_restart_mid_poll_does_not_disturb_in_flight_poll() {
    let registry = MockRegistry::new();
    registry.register(InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552), true);
    registry.register(InstanceRecord::with_port("i-2", "worker", NAMESPACE, 2552), true);
    let service = Arc::new(start(&registry, config(&["seed", "worker"])).await);

    registry.set_latency(Duration::from_millis(500));
    let in_flight = tokio::spawn({
        let service = service.clone();
        async move { service.get_nodes(true).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    service.restart_client().await;
    assert_eq!(service.client_generation(), 1);
    assert_eq!(registry.clients_created(), 2);

    // The retired client is still serving the in-flight poll.
    assert!(registry.disposed().is_empty());

    let nodes = in_flight.await.unwrap().unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(
        registry
            .queries()
            .iter()
            .all(|q| q.generation == 0)
    );

    // Retirement completes once the poll released the old client.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(registry.disposed(), vec![0]);

    registry.clear_queries();
    registry.set_latency(Duration::ZERO);
    assert_eq!(service.get_nodes(true).await.unwrap().len(), 2);
    let queries = registry.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries.iter().all(|q| q.generation == 1));

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_slow_poll_outlives_dispose_grace() {
    let registry = MockRegistry::new();
    registry.register(InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552), true);
    let mut config = config(&["seed"]);
    config.dispose_grace = Duration::from_secs(1);
    let service = Arc::new(start(&registry, config).await);

    registry.set_latency(Duration::from_secs(3));
    let in_flight = tokio::spawn({
        let service = service.clone();
        async move { service.get_nodes(true).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    service.restart_client().await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(registry.disposed().is_empty());
    assert!(logs_contain("in-flight users"));

    let nodes = in_flight.await.unwrap().unwrap();
    assert_eq!(nodes, [address("i-1", "seed", 2552)].into_iter().collect());

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(registry.disposed(), vec![0]);

    registry.set_latency(Duration::ZERO);
    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_lets_in_flight_poll_finish() {
    let registry = MockRegistry::new();
    registry.register(InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552), true);
    let service = Arc::new(start(&registry, config(&["seed"])).await);

    registry.set_latency(Duration::from_millis(500));
    let in_flight = tokio::spawn({
        let service = service.clone();
        async move { service.get_nodes(true).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    service.shutdown().await;

    assert_eq!(registry.disposed(), vec![0]);
    let nodes = in_flight.await.unwrap().unwrap();
    assert_eq!(nodes.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_does_not_wait_for_registry() {
    let registry = MockRegistry::new();
    registry.register(InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552), true);
    registry.set_latency(Duration::from_secs(30));

    let started_at = tokio::time::Instant::now();
    let service = DiscoveryService::from_config(config(&["seed"]), identity(), registry.clone())
        .await
        .unwrap();

    assert!(started_at.elapsed() < Duration::from_secs(1));
    assert_eq!(service.state(), ServiceState::Ready);

    let mut membership = service.subscribe();
    assert!(membership.borrow_and_update().is_empty());

    membership.changed().await.unwrap();
    assert_eq!(membership.borrow_and_update().len(), 1);

    registry.set_latency(Duration::ZERO);
    service.shutdown().await;
}

#[tokio::test]
async fn test_failed_restart_keeps_serving() {
    let registry = MockRegistry::new();
    registry.register(InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552), true);
    let service = start(&registry, config(&["seed"])).await;

    registry.fail_client_creation(true);
    service.restart_client().await;

    assert_eq!(service.client_generation(), 0);
    assert!(registry.disposed().is_empty());
    assert_eq!(service.get_nodes(true).await.unwrap().len(), 1);

    service.shutdown().await;
    assert_eq!(registry.disposed(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_restarts_stop_after_shutdown() {
    let registry = MockRegistry::new();
    registry.add_service(NAMESPACE, "seed");
    let mut config = config(&["seed"]);
    config.restart_interval = Some(Duration::from_secs(60));
    let service = start(&registry, config).await;

    tokio::time::sleep(Duration::from_secs(60 * 3 + 30)).await;
    assert_eq!(registry.clients_created(), 4);
    assert_eq!(service.client_generation(), 3);

    service.shutdown().await;
    assert_eq!(service.state(), ServiceState::Stopped);

    tokio::time::sleep(Duration::from_secs(60 * 10)).await;
    assert_eq!(registry.clients_created(), 4);

    let mut disposed = registry.disposed();
    disposed.sort_unstable();
    assert_eq!(disposed, vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_restart_interval_never_restarts() {
    let registry = MockRegistry::new();
    registry.add_service(NAMESPACE, "seed");
    let mut config = config(&["seed"]);
    config.restart_interval = Some(Duration::ZERO);
    let service = start(&registry, config).await;

    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert_eq!(registry.clients_created(), 1);

    service.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn test_shutdown_disposes_current_client_once() {
    let registry = MockRegistry::new();
    registry.add_service(NAMESPACE, "seed");
    let service = start(&registry, config(&["seed"])).await;

    service.restart_client().await;
    service.shutdown().await;
    service.shutdown().await;
    service.wait().await;

    assert_eq!(service.state(), ServiceState::Stopped);
    let disposed = registry.disposed();
    assert_eq!(disposed.iter().filter(|g| **g == 1).count(), 1);
    assert_eq!(disposed.iter().filter(|g| **g == 0).count(), 1);

    assert!(matches!(
        service.get_nodes(true).await,
        Err(DiscoveryError::NotReady(ServiceState::Stopped))
    ));

    service.restart_client().await;
    assert_eq!(registry.clients_created(), 2);
}

#[tokio::test]
async fn test_registration_operations_are_no_ops() {
    let registry = MockRegistry::new();
    registry.add_service(NAMESPACE, "seed");
    let service = start(&registry, config(&["seed"])).await;

    let entry = MemberEntry::new(
        address("self", "seed", 2552),
        BTreeSet::from(["backend".to_string()]),
    );

    service.register_node(&entry).await.unwrap();
    service.mark_as_alive(&entry).await.unwrap();
    service.deregister_node(&entry).await.unwrap();

    assert!(registry.queries().is_empty());
    assert!(ClusterDiscovery::get_nodes(&service, true).await.unwrap().is_empty());

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_publishes_membership_changes() {
    let registry = MockRegistry::new();
    registry.register(InstanceRecord::with_port("i-1", "seed", NAMESPACE, 2552), true);
    let mut config = config(&["seed"]);
    config.refresh_interval = Duration::from_secs(30);
    let service = start(&registry, config).await;

    let mut membership = service.subscribe();
    assert_eq!(
        *membership.borrow_and_update(),
        [address("i-1", "seed", 2552)].into_iter().collect()
    );

    registry.register(InstanceRecord::with_port("i-2", "seed", NAMESPACE, 2552), true);
    membership.changed().await.unwrap();

    let current = membership.borrow_and_update().clone();
    assert_eq!(current.len(), 2);
    assert!(current.contains(&address("i-2", "seed", 2552)));

    service.shutdown().await;
}
