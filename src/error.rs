// Error types for the emotion overlay pipeline.

use thiserror::Error;

/// Every failure the overlay pipeline can surface.
///
/// Only `ResourceLoad` is fatal, and only at start-up. The rest are recovered
/// locally: a skipped face, a dropped frame, or a failed attempt that the next
/// frame retries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// A coordinator was used before its worker context was attached.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The raw camera buffer could not be turned into an image.
    #[error("Frame decode failed: {0}")]
    Decode(String),

    /// A face rectangle fell outside the rotated frame or collapsed to nothing.
    #[error("Invalid face region: {0}")]
    InvalidRegion(String),

    /// The face detector or the emotion model reported a failure.
    #[error("Engine error: {0}")]
    Engine(String),

    /// A model or label asset could not be loaded.
    #[error("Resource load failed: {0}")]
    ResourceLoad(String),

    /// A shared component was used before it was initialized.
    #[error("{0} used before initialization")]
    NotInitialized(&'static str),

    /// A shared component was initialized a second time.
    #[error("{0} already initialized")]
    AlreadyInitialized(&'static str),
}

/// Result type alias for overlay pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::ResourceLoad(err.to_string())
    }
}

/// Failure reported by an external engine (detector or classifier).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        PipelineError::Engine(err.0)
    }
}
