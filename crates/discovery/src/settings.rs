//! Discovery configuration and its validated snapshot.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Default interval at which a node reports itself alive.
pub const DEFAULT_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Default time after which a silent node is considered dead.
pub const DEFAULT_ALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between membership refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of join attempts made by the cluster layer.
pub const DEFAULT_JOIN_RETRIES: u32 = 3;

/// Default time a retired client may keep in-flight queries before a warning is logged.
pub const DEFAULT_DISPOSE_GRACE: Duration = Duration::from_secs(10);

/// Raw discovery configuration, as read from a settings file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Registry region, e.g. `ap-southeast-1`.
    pub region: String,

    /// Optional endpoint override for the registry API.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Registry namespace holding the cluster services.
    pub namespace: String,

    /// Services to query, in order.
    pub services: Vec<String>,

    /// Interval for periodic client restarts. Absent or zero disables restarts.
    #[serde(default, with = "humantime_serde")]
    pub restart_interval: Option<Duration>,

    /// Interval at which nodes report themselves alive
    #[serde(default = "default_alive_interval", with = "humantime_serde")]
    pub alive_interval: Duration,

    /// Time after which a silent node is considered dead
    #[serde(default = "default_alive_timeout", with = "humantime_serde")]
    pub alive_timeout: Duration,

    /// Interval between membership refreshes
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Join attempts made by the cluster layer
    #[serde(default = "default_join_retries")]
    pub join_retries: u32,

    /// Registry health check TTL. Defaults to three alive intervals.
    #[serde(default, with = "humantime_serde")]
    pub service_check_ttl: Option<Duration>,

    /// Time a retired client may keep in-flight queries before a warning is logged
    #[serde(default = "default_dispose_grace", with = "humantime_serde")]
    pub dispose_grace: Duration,
}

const fn default_alive_interval() -> Duration {
    DEFAULT_ALIVE_INTERVAL
}

const fn default_alive_timeout() -> Duration {
    DEFAULT_ALIVE_TIMEOUT
}

const fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

const fn default_join_retries() -> u32 {
    DEFAULT_JOIN_RETRIES
}

const fn default_dispose_grace() -> Duration {
    DEFAULT_DISPOSE_GRACE
}

impl DiscoveryConfig {
    /// Create a configuration with default timings.
    pub fn new(
        region: impl Into<String>,
        namespace: impl Into<String>,
        services: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            namespace: namespace.into(),
            services: services.into_iter().map(Into::into).collect(),
            restart_interval: None,
            alive_interval: DEFAULT_ALIVE_INTERVAL,
            alive_timeout: DEFAULT_ALIVE_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            join_retries: DEFAULT_JOIN_RETRIES,
            service_check_ttl: None,
            dispose_grace: DEFAULT_DISPOSE_GRACE,
        }
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid for the settings schema.
    pub fn from_toml(contents: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(contents)?)
    }
}

/// Validated, immutable discovery settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoverySettings {
    region: String,
    endpoint: Option<String>,
    namespace: String,
    services: Vec<String>,
    restart_interval: Option<Duration>,
    alive_interval: Duration,
    alive_timeout: Duration,
    refresh_interval: Duration,
    join_retries: u32,
    service_check_ttl: Duration,
    dispose_grace: Duration,
}

impl DiscoverySettings {
    /// Validate a configuration into settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is empty or if
    /// `alive_interval <= service_check_ttl <= alive_timeout` does not hold.
    pub fn new(config: DiscoveryConfig) -> Result<Self, SettingsError> {
        if config.region.trim().is_empty() {
            return Err(SettingsError::Invalid("region must not be empty".to_string()));
        }

        if config.namespace.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "namespace must not be empty".to_string(),
            ));
        }

        if config.services.is_empty() {
            return Err(SettingsError::Invalid(
                "at least one service must be configured".to_string(),
            ));
        }

        if config.services.iter().any(|s| s.trim().is_empty()) {
            return Err(SettingsError::Invalid(
                "service names must not be empty".to_string(),
            ));
        }

        if config.refresh_interval.is_zero() {
            return Err(SettingsError::Invalid(
                "refresh_interval must be greater than zero".to_string(),
            ));
        }

        let service_check_ttl = match config.service_check_ttl {
            Some(ttl) => ttl,
            None => config.alive_interval.checked_mul(3).ok_or_else(|| {
                SettingsError::Invalid(format!(
                    "alive_interval {:?} is too large",
                    config.alive_interval
                ))
            })?,
        };

        if service_check_ttl < config.alive_interval || service_check_ttl > config.alive_timeout {
            return Err(SettingsError::IntervalOrdering {
                alive_interval: config.alive_interval,
                service_check_ttl,
                alive_timeout: config.alive_timeout,
            });
        }

        Ok(Self {
            region: config.region,
            endpoint: config.endpoint,
            namespace: config.namespace,
            services: config.services,
            restart_interval: config.restart_interval.filter(|i| !i.is_zero()),
            alive_interval: config.alive_interval,
            alive_timeout: config.alive_timeout,
            refresh_interval: config.refresh_interval,
            join_retries: config.join_retries,
            service_check_ttl,
            dispose_grace: config.dispose_grace,
        })
    }

    /// Load and validate settings from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::new(DiscoveryConfig::from_file(path)?)
    }

    /// Registry region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Registry endpoint override, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Registry namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Services to query, in configured order.
    #[must_use]
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Client restart interval; `None` means never restart.
    #[must_use]
    pub const fn restart_interval(&self) -> Option<Duration> {
        self.restart_interval
    }

    /// Alive reporting interval.
    #[must_use]
    pub const fn alive_interval(&self) -> Duration {
        self.alive_interval
    }

    /// Alive timeout.
    #[must_use]
    pub const fn alive_timeout(&self) -> Duration {
        self.alive_timeout
    }

    /// Membership refresh interval.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Join attempts made by the cluster layer.
    #[must_use]
    pub const fn join_retries(&self) -> u32 {
        self.join_retries
    }

    /// Registry health check TTL.
    #[must_use]
    pub const fn service_check_ttl(&self) -> Duration {
        self.service_check_ttl
    }

    /// Time a retired client may keep in-flight queries before a warning is logged.
    #[must_use]
    pub const fn dispose_grace(&self) -> Duration {
        self.dispose_grace
    }
}

impl TryFrom<DiscoveryConfig> for DiscoverySettings {
    type Error = SettingsError;

    fn try_from(config: DiscoveryConfig) -> Result<Self, Self::Error> {
        Self::new(config)
    }
}
