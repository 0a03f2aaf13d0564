//! Error types for herald-monitor.

use thiserror::Error;

/// Problems detected while assembling a monitor.
///
/// Routes are numbered from zero in the order they were added to the builder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("route {route} has no notifiers")]
    NoNotifiers { route: usize },

    #[error("route {route} declares no fields")]
    NoFields { route: usize },

    #[error("route {route} declares no pipelines")]
    NoPipelines { route: usize },

    #[error("route {route} has a field with an empty name")]
    EmptyFieldName { route: usize },

    #[error("route {route} declares field '{field}' more than once")]
    DuplicateField { route: usize, field: String },

    #[error("route {route} uses field '{field}' which is not in the source schema")]
    UnknownField { route: usize, field: String },

    #[error("route {route} is addressed but notifier '{notifier}' has no addressing")]
    MissingAddressing { route: usize, notifier: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Monitor runtime errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
