//! Registry client backed by AWS Cloud Map (`DiscoverInstances`).
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_servicediscovery::error::{DisplayErrorContext, SdkError};
use aws_sdk_servicediscovery::operation::discover_instances::DiscoverInstancesError;
use aws_sdk_servicediscovery::types::{HealthStatusFilter, HttpInstanceSummary};
use cluster_discovery::{
    DiscoverySettings, HealthFilter, InstanceRecord, RegistryClient, RegistryClientFactory,
    RegistryErrorKind, ServiceQuery,
};
use tracing::{debug, warn};

/// Registry client backed by AWS Cloud Map.
#[derive(Clone, Debug)]
pub struct CloudMapClient {
    client: aws_sdk_servicediscovery::Client,
    max_results: Option<i32>,
}

impl CloudMapClient {
    /// Wrap an SDK client, optionally capping results per query.
    #[must_use]
    pub fn new(client: aws_sdk_servicediscovery::Client, max_results: Option<i32>) -> Self {
        Self {
            client,
            max_results,
        }
    }
}

#[async_trait]
impl RegistryClient for CloudMapClient {
    type Error = Error;

    async fn discover_instances(&self, query: &ServiceQuery) -> Result<Vec<InstanceRecord>> {
        let resp = self
            .client
            .discover_instances()
            .namespace_name(&query.namespace)
            .service_name(&query.service_name)
            .health_status(health_status(query.health_filter))
            .set_max_results(self.max_results)
            .send()
            .await
            .map_err(request_error)?;

        Ok(resp
            .instances()
            .iter()
            .filter_map(|summary| to_record(summary, query))
            .collect())
    }

    async fn dispose(&self) -> Result<()> {
        // The SDK client releases its connection pool once the last clone is dropped.
        debug!("Releasing Cloud Map client");
        Ok(())
    }
}

/// Creates a [`CloudMapClient`] with a freshly loaded AWS config on every call.
#[derive(Clone, Debug, Default)]
pub struct CloudMapClientFactory {
    max_results: Option<i32>,
}

impl CloudMapClientFactory {
    /// Create a factory with no result cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of instances returned per service query.
    #[must_use]
    pub fn with_max_results(mut self, max_results: i32) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

#[async_trait]
impl RegistryClientFactory for CloudMapClientFactory {
    type Client = CloudMapClient;

    async fn create(&self, settings: &DiscoverySettings) -> Result<CloudMapClient> {
        let mut loader = aws_config::from_env().region(Region::new(settings.region().to_string()));

        if let Some(endpoint) = settings.endpoint() {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(Error::Settings(format!(
                    "endpoint must be an http(s) URL: {endpoint}"
                )));
            }
            loader = loader.endpoint_url(endpoint);
        }

        let config = loader.load().await;
        debug!("Created Cloud Map client for region {}", settings.region());

        Ok(CloudMapClient::new(
            aws_sdk_servicediscovery::Client::new(&config),
            self.max_results,
        ))
    }
}

fn health_status(filter: HealthFilter) -> HealthStatusFilter {
    match filter {
        HealthFilter::All => HealthStatusFilter::All,
        HealthFilter::HealthyOnly => HealthStatusFilter::Healthy,
    }
}

fn request_error<R>(e: SdkError<DiscoverInstancesError, R>) -> Error
where
    R: std::fmt::Debug,
{
    let kind = match &e {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => RegistryErrorKind::Transport,
        SdkError::ResponseError(_) => RegistryErrorKind::Malformed,
        SdkError::ServiceError(service_error) => match service_error.err() {
            DiscoverInstancesError::NamespaceNotFound(_)
            | DiscoverInstancesError::ServiceNotFound(_) => RegistryErrorKind::NotFound,
            DiscoverInstancesError::RequestLimitExceeded(_) => RegistryErrorKind::Throttled,
            DiscoverInstancesError::InvalidInput(_) => RegistryErrorKind::Malformed,
            _ => RegistryErrorKind::Other,
        },
        _ => RegistryErrorKind::Other,
    };

    Error::Request {
        kind,
        message: DisplayErrorContext(&e).to_string(),
    }
}

fn to_record(summary: &HttpInstanceSummary, query: &ServiceQuery) -> Option<InstanceRecord> {
    let (Some(instance_id), Some(service_name), Some(namespace_name)) = (
        summary.instance_id(),
        summary.service_name(),
        summary.namespace_name(),
    ) else {
        warn!(
            service = %query.service_name,
            namespace = %query.namespace,
            "Skipping malformed Cloud Map instance summary: {:?}",
            summary
        );
        return None;
    };

    Some(InstanceRecord {
        instance_id: instance_id.to_string(),
        service_name: service_name.to_string(),
        namespace_name: namespace_name.to_string(),
        attributes: summary.attributes().cloned().unwrap_or_default(),
    })
}
