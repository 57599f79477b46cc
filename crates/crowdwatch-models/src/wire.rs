//! JSON schemas of the standalone invocation modes.
//!
//! - Windowed inference: [`WindowRequest`] on stdin, [`WindowResponse`] on
//!   stdout, [`WindowResponseError`] on stderr with a non-zero exit.
//! - Single frame: [`FrameFeatures`] or [`FramePanicResponse`] on stdout,
//!   [`FrameFeaturesError`] or [`FramePanicError`] on stderr.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::NEUTRAL_CONFIDENCE;

/// Raw (unnormalized) window sent to the sequence inference worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WindowRequest {
    pub motion_energy: Vec<f64>,
    pub flux_of_count: Vec<f64>,
}

impl WindowRequest {
    pub fn new(motion_energy: Vec<f64>, flux_of_count: Vec<f64>) -> Self {
        Self {
            motion_energy,
            flux_of_count,
        }
    }
}

/// Successful windowed-inference answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WindowResponse {
    pub panic_detected: bool,
    pub confidence: f64,
    pub threshold: f64,
}

/// Safe default emitted by the inference worker when it cannot answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WindowResponseError {
    pub panic_detected: bool,
    pub confidence: f64,
    pub error: String,
}

impl WindowResponseError {
    pub fn safe_default(error: impl Into<String>) -> Self {
        Self {
            panic_detected: false,
            confidence: NEUTRAL_CONFIDENCE,
            error: error.into(),
        }
    }
}

/// Single-frame features answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrameFeatures {
    pub motion_energy: f64,
    pub flux_of_count: f64,
}

/// Single-frame features failure, zeros reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrameFeaturesError {
    pub error: String,
    pub motion_energy: f64,
    pub flux_of_count: f64,
}

impl FrameFeaturesError {
    pub fn zeros(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            motion_energy: 0.0,
            flux_of_count: 0.0,
        }
    }
}

/// Single-frame panic answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FramePanicResponse {
    pub panic_detected: bool,
    pub confidence: f64,
    pub motion_energy: f64,
    pub flux_of_count: f64,
}

/// Single-frame panic failure, neutral confidence reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FramePanicError {
    pub panic_detected: bool,
    pub confidence: f64,
    pub error: String,
}

impl FramePanicError {
    pub fn safe_default(error: impl Into<String>) -> Self {
        Self {
            panic_detected: false,
            confidence: NEUTRAL_CONFIDENCE,
            error: error.into(),
        }
    }
}
