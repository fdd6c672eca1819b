//! Abstract interface to the service registry that holds cluster instances.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::settings::DiscoverySettings;

/// Attribute key under which the registry stores an instance's port.
pub const INSTANCE_PORT_ATTRIBUTE: &str = "AWS_INSTANCE_PORT";

/// Which instances a query should return.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum HealthFilter {
    /// Every registered instance, regardless of health.
    All,

    /// Only instances the registry currently reports as healthy.
    HealthyOnly,
}

impl HealthFilter {
    /// Filter matching the `only_alive` flag of a membership request.
    #[must_use]
    pub const fn from_only_alive(only_alive: bool) -> Self {
        if only_alive {
            Self::HealthyOnly
        } else {
            Self::All
        }
    }
}

/// A single "list instances of service S" request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceQuery {
    /// Registry namespace the service lives in.
    pub namespace: String,

    /// Name of the service to list.
    pub service_name: String,

    /// Health filter applied by the registry.
    pub health_filter: HealthFilter,
}

impl ServiceQuery {
    /// Create a new query.
    pub fn new(
        namespace: impl Into<String>,
        service_name: impl Into<String>,
        health_filter: HealthFilter,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            service_name: service_name.into(),
            health_filter,
        }
    }
}

/// One registered endpoint as reported by the registry.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Registry-assigned instance id.
    pub instance_id: String,

    /// Service the instance is registered under.
    pub service_name: String,

    /// Namespace of the service.
    pub namespace_name: String,

    /// Free-form attributes. Must carry [`INSTANCE_PORT_ATTRIBUTE`] to be resolvable.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl InstanceRecord {
    /// Create a record that advertises the given port.
    pub fn with_port(
        instance_id: impl Into<String>,
        service_name: impl Into<String>,
        namespace_name: impl Into<String>,
        port: impl ToString,
    ) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(INSTANCE_PORT_ATTRIBUTE.to_string(), port.to_string());

        Self {
            instance_id: instance_id.into(),
            service_name: service_name.into(),
            namespace_name: namespace_name.into(),
            attributes,
        }
    }
}

/// The kind of registry error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegistryErrorKind {
    /// Network or transport level failure (includes timeouts)
    Transport,

    /// The registry rejected the request because of rate limiting
    Throttled,

    /// The namespace or service does not exist
    NotFound,

    /// The registry answered with something we could not interpret
    Malformed,

    /// Other/unknown error
    Other,
}

impl Display for RegistryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Marker trait for `RegistryClient` errors
pub trait RegistryError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> RegistryErrorKind;
}

/// A live connection to the service registry.
#[async_trait]
pub trait RegistryClient
where
    Self: Send + Sync + 'static,
{
    /// The error type for this client.
    type Error: RegistryError;

    /// List the instances of one service.
    async fn discover_instances(
        &self,
        query: &ServiceQuery,
    ) -> Result<Vec<InstanceRecord>, Self::Error>;

    /// Release any resources held by the client. Called at most once per client.
    async fn dispose(&self) -> Result<(), Self::Error>;
}

/// Creates fresh registry clients, used at start-up and on every client restart.
#[async_trait]
pub trait RegistryClientFactory
where
    Self: Send + Sync + 'static,
{
    /// The client type produced by this factory.
    type Client: RegistryClient;

    /// Create a brand-new client from the settings.
    async fn create(
        &self,
        settings: &DiscoverySettings,
    ) -> Result<Self::Client, <Self::Client as RegistryClient>::Error>;
}
