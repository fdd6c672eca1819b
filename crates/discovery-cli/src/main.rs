//! CLI binary that follows cluster membership as published in the service registry.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::path::PathBuf;

use clap::Parser;
use cluster_discovery::{
    ClusterIdentity, DiscoveryService, DiscoverySettings, MembershipSet, RegistryClientFactory,
};
use cluster_discovery_cloudmap::CloudMapClientFactory;
use cluster_discovery_mock::MockRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Discovery service error
    #[error(transparent)]
    Discovery(#[from] cluster_discovery::DiscoveryError),

    /// Mock registry fixture error
    #[error("mock registry error: {0}")]
    MockRegistry(#[from] cluster_discovery_mock::Error),

    /// Settings file error
    #[error("settings error: {0}")]
    Settings(#[from] cluster_discovery::SettingsError),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the TOML discovery settings
    #[arg(long, env = "CLUSTER_DISCOVERY_CONFIG")]
    config: PathBuf,

    /// Serve membership from a JSON fixture instead of Cloud Map
    #[arg(long, env = "CLUSTER_DISCOVERY_MOCK_REGISTRY")]
    mock_registry: Option<PathBuf>,

    /// Protocol prefix of node addresses
    #[arg(long, default_value = "akka.tcp", env = "CLUSTER_DISCOVERY_PROTOCOL")]
    protocol: String,

    /// Cluster system name (defaults to the registry namespace)
    #[arg(long, env = "CLUSTER_DISCOVERY_SYSTEM")]
    system: Option<String>,

    /// Maximum number of instances Cloud Map returns per service
    #[arg(long, env = "CLUSTER_DISCOVERY_MAX_RESULTS")]
    max_results: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = DiscoverySettings::from_file(&args.config)?;
    let identity = ClusterIdentity::new(
        args.protocol.clone(),
        args.system
            .clone()
            .unwrap_or_else(|| settings.namespace().to_string()),
    );

    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt signal: {}", e);
        } else {
            info!("Received interrupt signal");
        }

        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    if let Some(fixture) = &args.mock_registry {
        info!("Using mock registry from {}", fixture.display());
        let registry = MockRegistry::from_fixture_file(fixture)?;
        run(settings, identity, registry, shutdown_token).await
    } else {
        let mut factory = CloudMapClientFactory::new();
        if let Some(max_results) = args.max_results {
            factory = factory.with_max_results(max_results);
        }
        run(settings, identity, factory, shutdown_token).await
    }
}

async fn run<F>(
    settings: DiscoverySettings,
    identity: ClusterIdentity,
    factory: F,
    shutdown_token: CancellationToken,
) -> Result<(), Error>
where
    F: RegistryClientFactory,
{
    let service = DiscoveryService::start(settings, identity, factory).await?;

    let mut membership = service.subscribe();

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            changed = membership.changed() => {
                if changed.is_err() {
                    break;
                }
                log_membership(&membership.borrow_and_update());
            }
        }
    }

    service.shutdown().await;

    Ok(())
}

fn log_membership(membership: &MembershipSet) {
    info!("Cluster membership ({} nodes)", membership.len());
    for node in membership.sorted() {
        info!("  {}", node);
    }
}
