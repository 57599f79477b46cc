//! Single-frame invocation mode.
//!
//! Scores one encoded frame without any stream context: motion energy is
//! the edge-energy proxy and the count is the geometric contour count.

use std::str::FromStr;

use crowdwatch_media::{edge_energy, Frame, GeometricDensity};
use crowdwatch_models::{FrameFeatures, FramePanicResponse};

use crate::error::{PipelineError, PipelineResult};

/// Confidence above which panic mode reports a panic.
pub const PANIC_CONFIDENCE: f64 = 0.7;

/// Edge energy that maps to full confidence in panic mode.
pub const ENERGY_FOR_FULL_CONFIDENCE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    #[default]
    Features,
    Panic,
}

impl FromStr for FrameMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "features" => Ok(Self::Features),
            "panic" => Ok(Self::Panic),
            other => Err(PipelineError::config(format!("invalid frame mode '{other}'"))),
        }
    }
}

/// Features of one encoded frame.
pub fn frame_features(bytes: &[u8]) -> PipelineResult<FrameFeatures> {
    let gray = Frame::decode(0, 0, bytes)?.to_gray();
    Ok(FrameFeatures {
        motion_energy: edge_energy(&gray)?,
        flux_of_count: GeometricDensity::default().count_blobs(&gray)? as f64,
    })
}

/// Panic verdict of one encoded frame.
///
/// `confidence = min(motion_energy / 100, 1)`, panic when above 0.7.
pub fn frame_panic(bytes: &[u8]) -> PipelineResult<FramePanicResponse> {
    let features = frame_features(bytes)?;
    let confidence = (features.motion_energy / ENERGY_FOR_FULL_CONFIDENCE).min(1.0);
    Ok(FramePanicResponse {
        panic_detected: confidence > PANIC_CONFIDENCE,
        confidence,
        motion_energy: features.motion_energy,
        flux_of_count: features.flux_of_count,
    })
}
