//! Error types for discovery operations

use std::time::Duration;

use thiserror::Error;

use crate::service::ServiceState;

/// Settings could not be loaded or violate an invariant.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid TOML for the settings schema.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has an unusable value.
    #[error("invalid settings: {0}")]
    Invalid(String),

    /// `alive_interval <= service_check_ttl <= alive_timeout` does not hold.
    #[error(
        "service-check-ttl ({service_check_ttl:?}) must be between alive-interval ({alive_interval:?}) and alive-timeout ({alive_timeout:?})"
    )]
    IntervalOrdering {
        /// Configured alive interval.
        alive_interval: Duration,

        /// Configured (or defaulted) service check TTL.
        service_check_ttl: Duration,

        /// Configured alive timeout.
        alive_timeout: Duration,
    },
}

/// A registry record could not be turned into a node address.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ResolveError {
    /// The record carries no port attribute.
    #[error("instance has no port attribute")]
    MissingPort,

    /// The port attribute is not a valid port number.
    #[error("invalid port attribute: {0:?}")]
    InvalidPort(String),
}

/// Errors surfaced by the discovery service.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Settings were rejected at construction.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The initial registry client could not be created.
    #[error("failed to create registry client: {0}")]
    ClientCreation(String),

    /// The service is not accepting requests.
    #[error("discovery service is not ready (state: {0})")]
    NotReady(ServiceState),
}

/// Result alias for discovery operations.
pub type Result<T, E = DiscoveryError> = std::result::Result<T, E>;
