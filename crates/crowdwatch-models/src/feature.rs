//! Per-frame feature vector.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Measurements taken from a single processed frame.
///
/// All channels come from the same frame. `motion_energy` and
/// `flux_of_count` are the two channels fed to the sequence model; the
/// counts are carried along so the rule classifier can be driven from the
/// same tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Monotonic frame tick (0-based frame index within the stream).
    pub timestamp: u64,
    /// Aggregate motion magnitude, never negative.
    pub motion_energy: f64,
    /// Absolute change of the live count since the previous tick.
    pub flux_of_count: f64,
    /// Number of counted entities visible in this frame.
    #[serde(default)]
    pub live_count: usize,
    /// Count estimated by the density strategy for this frame.
    #[serde(default)]
    pub density_count: f64,
}

impl FeatureVector {
    /// Create a vector from the two classifier channels.
    ///
    /// Negative or non-finite inputs are clamped to zero.
    pub fn new(timestamp: u64, motion_energy: f64, flux_of_count: f64) -> Self {
        Self {
            timestamp,
            motion_energy: non_negative(motion_energy),
            flux_of_count: non_negative(flux_of_count),
            live_count: 0,
            density_count: 0.0,
        }
    }

    /// Attach the live and density counts of the frame.
    pub fn with_counts(mut self, live_count: usize, density_count: f64) -> Self {
        self.live_count = live_count;
        self.density_count = non_negative(density_count);
        self
    }

    /// The two sequence-model channels in model order.
    pub fn channels(&self) -> [f64; 2] {
        [self.motion_energy, self.flux_of_count]
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
