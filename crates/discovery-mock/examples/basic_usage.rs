use cluster_discovery::{ClusterIdentity, DiscoveryConfig, DiscoveryService, InstanceRecord};
use cluster_discovery_mock::MockRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = MockRegistry::new();

    registry.register(
        InstanceRecord::with_port("i-0a1", "seed", "cluster.local", 2552),
        true,
    );
    registry.register(
        InstanceRecord::with_port("i-0b2", "worker", "cluster.local", 2552),
        true,
    );
    registry.register(
        InstanceRecord::with_port("i-0c3", "worker", "cluster.local", 2552),
        false,
    );

    let config = DiscoveryConfig::new("local", "cluster.local", ["seed", "worker"]);
    let identity = ClusterIdentity::new("akka.tcp", "example");
    let service = DiscoveryService::from_config(config, identity, registry.clone()).await?;

    println!("Alive nodes:");
    for node in service.get_nodes(true).await?.sorted() {
        println!("  {node}");
    }

    println!("All listed nodes:");
    for node in service.get_nodes(false).await?.sorted() {
        println!("  {node}");
    }

    service.restart_client().await;
    println!("Client generation after restart: {}", service.client_generation());

    service.shutdown().await;
    println!("Disposed client generations: {:?}", registry.disposed());

    Ok(())
}
