//! Error types for the mock registry implementation.

use cluster_discovery::{RegistryError, RegistryErrorKind};
use thiserror::Error;

/// Error type for the mock registry implementation.
#[derive(Debug, Error)]
pub enum Error {
    /// The queried namespace or service is not registered.
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// The service was scripted to fail.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The client was used after being disposed.
    #[error("Client generation {0} used after dispose")]
    Disposed(u64),

    /// Client creation was scripted to fail.
    #[error("Client creation failed: {0}")]
    ClientCreation(String),

    /// Error when loading or parsing a fixture file.
    #[error("Fixture file error: {0}")]
    FixtureFile(String),
}

impl RegistryError for Error {
    fn kind(&self) -> RegistryErrorKind {
        match self {
            Self::ServiceNotFound(_) => RegistryErrorKind::NotFound,
            Self::ServiceUnavailable(_) => RegistryErrorKind::Transport,
            Self::FixtureFile(_) => RegistryErrorKind::Malformed,
            Self::Disposed(_) | Self::ClientCreation(_) => RegistryErrorKind::Other,
        }
    }
}
