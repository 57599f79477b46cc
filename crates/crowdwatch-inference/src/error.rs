//! Error types for sequence inference.

use std::time::Duration;
use thiserror::Error;

/// Result type for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Sequence model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Malformed window: {0}")]
    MalformedWindow(String),

    #[error("Numeric failure: {0}")]
    Numeric(String),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference worker failed: {0}")]
    Process(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn malformed_window(msg: impl Into<String>) -> Self {
        Self::MalformedWindow(msg.into())
    }

    pub fn numeric(msg: impl Into<String>) -> Self {
        Self::Numeric(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
