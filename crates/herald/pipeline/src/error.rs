//! Error types for herald-pipeline.

use thiserror::Error;

/// Errors surfacing from a pipeline stage.
///
/// Errors travel in-band through the stream; a lane wrapped with
/// [`Pipeline::on_error_retry`](crate::Pipeline::on_error_retry) turns them
/// into a resubscription instead of terminating.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// A stage failed while processing a value.
    #[error("stage '{stage}' failed: {reason}")]
    Stage { stage: String, reason: String },

    /// An operator was constructed with unusable parameters.
    #[error("invalid operator '{operator}': {reason}")]
    InvalidOperator { operator: String, reason: String },

    /// The upstream source reported a failure.
    #[error("upstream failed: {0}")]
    Upstream(String),
}

impl PipelineError {
    pub fn stage(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for pipeline items.
pub type PipelineResult<T> = Result<T, PipelineError>;
