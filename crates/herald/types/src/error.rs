//! Errors reported by external collaborators through the ports.

use thiserror::Error;

use crate::ids::ResourceId;

/// Errors raised by data sources.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// A poll tick failed.
    #[error("poll failed: {0}")]
    PollFailed(String),

    /// A push stream reported an error.
    #[error("push stream failed: {0}")]
    StreamFailed(String),
}

/// Errors raised by notification sinks.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SinkError {
    /// Delivery to the listed recipients failed.
    #[error("delivery to {recipients:?} failed: {reason}")]
    DeliveryFailed {
        recipients: Vec<ResourceId>,
        reason: String,
    },

    /// The sink cannot accept notifications at all.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    pub fn delivery(recipients: &[ResourceId], reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            recipients: recipients.to_vec(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by subscriber repositories.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DirectoryError {
    /// The backing store could not be read.
    #[error("subscriber store unavailable: {0}")]
    Unavailable(String),

    /// The backing store returned malformed data.
    #[error("invalid subscriber record: {0}")]
    InvalidRecord(String),
}

/// Result type for subscriber repository operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
