use cluster_discovery::{RegistryError, RegistryErrorKind};
use thiserror::Error;

/// Result type for Cloud Map operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the Cloud Map client.
#[derive(Debug, Error)]
pub enum Error {
    /// A `DiscoverInstances` call failed.
    #[error("Cloud Map request failed: {message}")]
    Request {
        /// Classification of the failure.
        kind: RegistryErrorKind,

        /// SDK error with its full context.
        message: String,
    },

    /// The settings cannot be used to build a client.
    #[error("invalid settings: {0}")]
    Settings(String),
}

impl RegistryError for Error {
    fn kind(&self) -> RegistryErrorKind {
        match self {
            Self::Request { kind, .. } => *kind,
            Self::Settings(_) => RegistryErrorKind::Other,
        }
    }
}
