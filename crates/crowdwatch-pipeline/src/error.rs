//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Source failed: {0}")]
    Source(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Media error: {0}")]
    Media(#[from] crowdwatch_media::MediaError),

    #[error("Inference error: {0}")]
    Inference(#[from] crowdwatch_inference::InferenceError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn source_failed(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry(msg.into())
    }
}
