//! Mock implementation of the registry client for testing purposes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;

use config::Fixture;
pub use error::Error;

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cluster_discovery::{
    DiscoverySettings, HealthFilter, INSTANCE_PORT_ATTRIBUTE, InstanceRecord, RegistryClient,
    RegistryClientFactory, ServiceQuery,
};
use parking_lot::Mutex;
use tracing::debug;

/// A query as seen by the mock, tagged with the client generation that served it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedQuery {
    /// Generation of the client that received the query (0 for the first client).
    pub generation: u64,

    /// The query itself.
    pub query: ServiceQuery,
}

#[derive(Clone, Debug)]
struct MockInstance {
    record: InstanceRecord,
    healthy: bool,
}

#[derive(Clone, Debug)]
enum ServiceBehavior {
    Instances(Vec<MockInstance>),
    Unavailable(String),
}

#[derive(Debug, Default)]
struct Registry {
    namespaces: HashMap<String, HashMap<String, ServiceBehavior>>,
    latency: Duration,
    queries: Vec<RecordedQuery>,
    disposed: Vec<u64>,
}

#[derive(Debug, Default)]
struct Shared {
    registry: Mutex<Registry>,
    created: AtomicU64,
    fail_creation: AtomicBool,
}

/// In-memory registry that also acts as the factory for its own clients.
///
/// Clones share state, so a test can keep one handle for scripting and
/// inspection while the discovery service owns another.
#[derive(Clone, Debug, Default)]
pub struct MockRegistry {
    shared: Arc<Shared>,
}

impl MockRegistry {
    /// Create an empty mock registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under its own namespace and service.
    pub fn register(&self, record: InstanceRecord, healthy: bool) {
        let mut registry = self.shared.registry.lock();
        let service = registry
            .namespaces
            .entry(record.namespace_name.clone())
            .or_default()
            .entry(record.service_name.clone())
            .or_insert_with(|| ServiceBehavior::Instances(Vec::new()));

        match service {
            ServiceBehavior::Instances(instances) => {
                instances.push(MockInstance { record, healthy });
            }
            ServiceBehavior::Unavailable(_) => {
                *service = ServiceBehavior::Instances(vec![MockInstance { record, healthy }]);
            }
        }
    }

    /// Register an empty service so queries against it succeed with no instances.
    pub fn add_service(&self, namespace: &str, service: &str) {
        self.shared
            .registry
            .lock()
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .entry(service.to_string())
            .or_insert_with(|| ServiceBehavior::Instances(Vec::new()));
    }

    /// Make every query for the service fail until instances are registered again.
    pub fn fail_service(&self, namespace: &str, service: &str, message: &str) {
        self.shared
            .registry
            .lock()
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(
                service.to_string(),
                ServiceBehavior::Unavailable(message.to_string()),
            );
    }

    /// Delay every query by the given duration.
    pub fn set_latency(&self, latency: Duration) {
        self.shared.registry.lock().latency = latency;
    }

    /// Make subsequent client creation fail (or succeed again).
    pub fn fail_client_creation(&self, fail: bool) {
        self.shared.fail_creation.store(fail, Ordering::SeqCst);
    }

    /// All queries received so far, across every client generation.
    #[must_use]
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.shared.registry.lock().queries.clone()
    }

    /// Forget recorded queries.
    pub fn clear_queries(&self) {
        self.shared.registry.lock().queries.clear();
    }

    /// Number of clients created so far.
    #[must_use]
    pub fn clients_created(&self) -> u64 {
        self.shared.created.load(Ordering::SeqCst)
    }

    /// Generations of the clients disposed so far, in disposal order.
    #[must_use]
    pub fn disposed(&self) -> Vec<u64> {
        self.shared.registry.lock().disposed.clone()
    }

    /// Create a mock registry from a fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The fixture file cannot be read
    /// - The fixture file contains invalid JSON
    pub fn from_fixture_file<P: AsRef<Path>>(fixture_path: P) -> Result<Self, Error> {
        let mut file = File::open(fixture_path)
            .map_err(|e| Error::FixtureFile(format!("Failed to open fixture file: {e}")))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::FixtureFile(format!("Failed to read fixture file: {e}")))?;

        let fixture: Fixture = serde_json::from_str(&content)
            .map_err(|e| Error::FixtureFile(format!("Failed to parse fixture file: {e}")))?;

        let registry = Self::new();
        for service in fixture.services {
            if service.unavailable {
                registry.fail_service(&fixture.namespace, &service.name, "unavailable in fixture");
                continue;
            }

            registry.add_service(&fixture.namespace, &service.name);
            for instance in service.instances {
                let mut attributes = instance.attributes;
                if let Some(port) = instance.port {
                    attributes.insert(INSTANCE_PORT_ATTRIBUTE.to_string(), port.to_string());
                }

                registry.register(
                    InstanceRecord {
                        instance_id: instance.instance_id,
                        service_name: service.name.clone(),
                        namespace_name: fixture.namespace.clone(),
                        attributes,
                    },
                    instance.healthy,
                );
            }
        }

        Ok(registry)
    }

    fn new_client(&self) -> MockClient {
        let generation = self.shared.created.fetch_add(1, Ordering::SeqCst);
        debug!("Created mock registry client generation {}", generation);

        MockClient {
            generation,
            disposed: AtomicBool::new(false),
            shared: self.shared.clone(),
        }
    }
}

#[async_trait]
impl RegistryClientFactory for MockRegistry {
    type Client = MockClient;

    async fn create(&self, _settings: &DiscoverySettings) -> Result<MockClient, Error> {
        if self.shared.fail_creation.load(Ordering::SeqCst) {
            return Err(Error::ClientCreation("scripted failure".to_string()));
        }

        Ok(self.new_client())
    }
}

/// A client handed out by [`MockRegistry`].
#[derive(Debug)]
pub struct MockClient {
    generation: u64,
    disposed: AtomicBool,
    shared: Arc<Shared>,
}

impl MockClient {
    /// Generation of this client (0 for the first one created).
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this client has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for MockClient {
    type Error = Error;

    async fn discover_instances(
        &self,
        query: &ServiceQuery,
    ) -> Result<Vec<InstanceRecord>, Self::Error> {
        let latency = {
            let mut registry = self.shared.registry.lock();
            registry.queries.push(RecordedQuery {
                generation: self.generation,
                query: query.clone(),
            });
            registry.latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.is_disposed() {
            return Err(Error::Disposed(self.generation));
        }

        let registry = self.shared.registry.lock();
        let behavior = registry
            .namespaces
            .get(&query.namespace)
            .and_then(|services| services.get(&query.service_name))
            .ok_or_else(|| {
                Error::ServiceNotFound(format!("{}/{}", query.namespace, query.service_name))
            })?;

        match behavior {
            ServiceBehavior::Instances(instances) => Ok(instances
                .iter()
                .filter(|i| query.health_filter == HealthFilter::All || i.healthy)
                .map(|i| i.record.clone())
                .collect()),
            ServiceBehavior::Unavailable(message) => {
                Err(Error::ServiceUnavailable(message.clone()))
            }
        }
    }

    async fn dispose(&self) -> Result<(), Self::Error> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(Error::Disposed(self.generation));
        }

        self.shared.registry.lock().disposed.push(self.generation);
        Ok(())
    }
}
