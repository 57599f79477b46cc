//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while reading frames or extracting features.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Could not decode frame: {0}")]
    InputDecode(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video source: {0}")]
    InvalidSource(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Density inference failed: {0}")]
    InferenceFailed(String),

    #[error("Motion estimation failed: {0}")]
    MotionFailed(String),

    #[error("Malformed detection record: {0}")]
    MalformedDetections(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl MediaError {
    /// Create a frame decode error.
    pub fn input_decode(message: impl Into<String>) -> Self {
        Self::InputDecode(message.into())
    }

    /// Create a model unavailable error.
    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::ModelUnavailable(message.into())
    }

    /// Create a density inference failure.
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::InferenceFailed(message.into())
    }

    /// Create a motion estimation failure.
    pub fn motion_failed(message: impl Into<String>) -> Self {
        Self::MotionFailed(message.into())
    }

    /// Whether this error concerns a single frame only (the stream may go on).
    pub fn is_frame_level(&self) -> bool {
        matches!(
            self,
            MediaError::InputDecode(_)
                | MediaError::Image(_)
                | MediaError::InferenceFailed(_)
                | MediaError::MotionFailed(_)
        )
    }
}
