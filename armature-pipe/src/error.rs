// Error types for the Armature body pipeline

use std::sync::Arc;
use thiserror::Error;

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, BodyError>;

/// Errors surfaced by the body writer and the sinks it wraps.
///
/// `BodyError` is `Clone` because a single inner flush outcome is fanned out
/// to every flush request coalesced into it.
#[derive(Error, Debug, Clone)]
pub enum BodyError {
    /// The writer was driven out of contract (e.g. two buffer requests
    /// without an advance in between).
    #[error("Writer misuse: {0}")]
    Usage(&'static str),

    /// The wrapped sink reported a failure.
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// Caller-supplied failure forwarded to the sink's completion step.
    #[error("Response aborted: {0}")]
    Aborted(String),

    /// The drain task went away before resolving a flush or completion.
    #[error("Drain loop terminated before resolving the request")]
    DrainAborted,

    #[error("No tokio runtime available to drive the drain loop")]
    NoRuntime,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BodyError {
    /// Create a sink failure.
    pub fn sink(message: impl Into<String>) -> Self {
        BodyError::Sink(message.into())
    }

    /// Create a completion error to hand to `complete`.
    pub fn aborted(reason: impl Into<String>) -> Self {
        BodyError::Aborted(reason.into())
    }

    /// Check if this is a programming error rather than a runtime failure
    pub fn is_usage(&self) -> bool {
        matches!(self, BodyError::Usage(_))
    }

    /// Check if the error originated in the wrapped sink or its transport
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, BodyError::Sink(_) | BodyError::Io(_))
    }
}

impl From<std::io::Error> for BodyError {
    fn from(err: std::io::Error) -> Self {
        BodyError::Io(Arc::new(err))
    }
}
