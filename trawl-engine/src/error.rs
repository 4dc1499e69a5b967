//! Error types for the trawl engine

use thiserror::Error;
use trawl_core::domain::pipeline::PipelineId;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by engine control operations
///
/// Failures inside a running step never surface here; they are recorded on
/// the step and published as notifications.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No pipeline with this id in the registry
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(PipelineId),

    /// Template key missing from the catalog
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    /// Template cannot produce a runnable pipeline
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// Channel already bound to another live pipeline
    #[error("Channel {channel} is bound to pipeline {owner}")]
    ChannelBusy {
        /// Channel id
        channel: String,
        /// Pipeline currently holding the channel
        owner: PipelineId,
    },

    /// Pipeline has a command in flight on its current channel
    #[error("Pipeline {0} has a command in flight")]
    CaptureInFlight(PipelineId),

    /// Operation needs a terminal pipeline
    #[error("Pipeline {0} is still active")]
    PipelineActive(PipelineId),

    /// The runtime task has shut down
    #[error("Engine has stopped")]
    EngineStopped,
}

/// Errors reported by a session channel implementation
#[derive(Debug, Error)]
pub enum SessionError {
    /// Channel no longer accepts input
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Channel exists but the write failed
    #[error("Failed to send to channel {channel}: {reason}")]
    SendFailed {
        /// Channel id
        channel: String,
        /// Underlying failure
        reason: String,
    },
}

impl EngineError {
    /// Check if this error refers to a missing pipeline or template
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PipelineNotFound(_) | Self::UnknownTemplate(_))
    }
}
