//! Configuration for herald monitors

use std::collections::HashMap;
use std::time::Duration;

use herald_directory::DirectoryConfig;
use serde::{Deserialize, Serialize};

use crate::dispatch::AddressingStrategy;
use crate::error::ConfigError;

/// Main monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Data source configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Subscriber directory cache configuration
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Interval between polls of a pollable source
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Delay before resubscribing to a failed push source
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl SourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Eligibility metadata for one notification type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTypeConfig {
    /// Whether subscribers without an explicit subscription receive this type
    #[serde(default = "default_true")]
    pub default_enabled: bool,

    /// Contact channel a subscriber must have to receive this type
    #[serde(default)]
    pub required_channel: Option<String>,
}

impl Default for NotificationTypeConfig {
    fn default() -> Self {
        Self {
            default_enabled: true,
            required_channel: None,
        }
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Strategy used by routes built with `dispatch_configured()`
    #[serde(default)]
    pub strategy: AddressingStrategy,

    /// Recipients per sink call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sink calls in flight per detected value
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Eligibility metadata keyed by notification type id
    #[serde(default)]
    pub notification_types: HashMap<String, NotificationTypeConfig>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: AddressingStrategy::default(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            notification_types: HashMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    30_000
}

fn default_retry_delay() -> u64 {
    5_000
}

fn default_batch_size() -> usize {
    1
}

fn default_max_concurrency() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MonitorConfig {
    /// Load configuration: defaults, then the optional file, then `HERALD_*`
    /// environment variables (`HERALD_DISPATCH__BATCH_SIZE=10`).
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&MonitorConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HERALD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: MonitorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("source.poll_interval_ms must be positive".into()));
        }
        if self.dispatch.batch_size == 0 {
            return Err(ConfigError::Invalid("dispatch.batch_size must be positive".into()));
        }
        if self.dispatch.max_concurrency == 0 {
            return Err(ConfigError::Invalid("dispatch.max_concurrency must be positive".into()));
        }
        Ok(())
    }

    /// Register eligibility metadata for a notification type.
    pub fn with_notification_type(mut self, type_id: impl Into<String>, meta: NotificationTypeConfig) -> Self {
        self.dispatch.notification_types.insert(type_id.into(), meta);
        self
    }
}
