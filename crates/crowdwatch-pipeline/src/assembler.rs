//! Per-frame feature assembly.
//!
//! Combines the motion, density and identity measurements of one frame into
//! the [`FeatureVector`] fed to both classifiers, and derives the flux of
//! count against the previous tick.

use crowdwatch_media::{DensityEstimate, IdentitySnapshot, MotionSample};
use crowdwatch_models::FeatureVector;

use crate::config::CountSource;
use crate::rules::RiskInput;

/// Raw measurements of one frame.
#[derive(Debug, Clone)]
pub struct FrameMeasurements {
    pub motion: MotionSample,
    pub density: DensityEstimate,
    pub identity: IdentitySnapshot,
}

/// Features of one frame, ready for classification.
#[derive(Debug, Clone)]
pub struct AssembledFrame {
    pub features: FeatureVector,
    pub risk: RiskInput,
    pub unique_count: usize,
}

#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    count_source: CountSource,
    previous_count: Option<f64>,
}

impl FeatureAssembler {
    pub fn new(count_source: CountSource) -> Self {
        Self {
            count_source,
            previous_count: None,
        }
    }

    pub fn count_source(&self) -> CountSource {
        self.count_source
    }

    /// Build the feature vector for frame `timestamp`.
    ///
    /// Flux is `|count_t - count_{t-1}|` over the configured count source and
    /// is zero on the first frame.
    pub fn assemble(&mut self, timestamp: u64, measurements: &FrameMeasurements) -> AssembledFrame {
        let live_count = measurements.identity.live_count;
        let density_count = measurements.density.count;

        let count = match self.count_source {
            CountSource::Tracker => live_count as f64,
            CountSource::Density => density_count,
        };
        let flux = self
            .previous_count
            .map(|previous| (count - previous).abs())
            .unwrap_or(0.0);
        self.previous_count = Some(count);

        let risk = match (&measurements.motion.field, &measurements.density.map) {
            (Some(field), Some(map)) => {
                RiskInput::new(field.density_weighted_sum(map), density_count)
            }
            (Some(field), None) => RiskInput::new(field.uniform_weighted_sum(count), count),
            (None, _) => RiskInput::new(0.0, count),
        };

        AssembledFrame {
            features: FeatureVector::new(timestamp, measurements.motion.energy, flux)
                .with_counts(live_count, density_count),
            risk,
            unique_count: measurements.identity.unique_count,
        }
    }

    pub fn reset(&mut self) {
        self.previous_count = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdwatch_media::MotionField;
    use ndarray::Array2;

    fn measurements(energy: f64, live: usize, density: f64) -> FrameMeasurements {
        FrameMeasurements {
            motion: MotionSample {
                energy,
                field: None,
            },
            density: DensityEstimate::count(density),
            identity: IdentitySnapshot {
                live_count: live,
                unique_count: live,
            },
        }
    }

    #[test]
    fn test_first_frame_has_zero_flux() {
        let mut assembler = FeatureAssembler::new(CountSource::Tracker);
        let frame = assembler.assemble(0, &measurements(0.0, 12, 0.0));
        assert_eq!(frame.features.flux_of_count, 0.0);
        assert_eq!(frame.features.live_count, 12);
    }

    #[test]
    fn test_flux_is_absolute_change() {
        let mut assembler = FeatureAssembler::new(CountSource::Tracker);
        assembler.assemble(0, &measurements(0.0, 12, 0.0));
        assert_eq!(assembler.assemble(1, &measurements(0.0, 20, 0.0)).features.flux_of_count, 8.0);
        assert_eq!(assembler.assemble(2, &measurements(0.0, 5, 0.0)).features.flux_of_count, 15.0);
    }

    #[test]
    fn test_density_count_source() {
        let mut assembler = FeatureAssembler::new(CountSource::Density);
        assembler.assemble(0, &measurements(0.0, 3, 10.5));
        let frame = assembler.assemble(1, &measurements(0.0, 3, 14.0));
        assert!((frame.features.flux_of_count - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_reset_restarts_flux() {
        let mut assembler = FeatureAssembler::new(CountSource::Tracker);
        assembler.assemble(0, &measurements(0.0, 12, 0.0));
        assembler.reset();
        assert_eq!(assembler.assemble(1, &measurements(0.0, 40, 0.0)).features.flux_of_count, 0.0);
    }

    #[test]
    fn test_risk_uses_density_map() {
        let mut assembler = FeatureAssembler::new(CountSource::Density);
        let field = MotionField::new(Array2::from_elem((4, 4), 2.0), Array2::zeros((4, 4)));
        let map = Array2::from_elem((2, 2), 1.0f32);
        let frame = assembler.assemble(
            0,
            &FrameMeasurements {
                motion: MotionSample {
                    energy: 2.0,
                    field: Some(field),
                },
                density: DensityEstimate {
                    count: 4.0,
                    map: Some(map),
                },
                identity: IdentitySnapshot::default(),
            },
        );
        assert!((frame.risk.weighted_motion - 8.0).abs() < 1e-9);
        assert!((frame.risk.score(10.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_risk_is_calibrated_on_reference_resolution() {
        // 1.875px at 320x320 is a 6px horizontal shift at 1024x576
        let field = MotionField::new(Array2::from_elem((320, 320), 1.875), Array2::zeros((320, 320)))
            .with_risk_scale(1024.0 / 320.0, 576.0 / 320.0);
        let mut assembler = FeatureAssembler::new(CountSource::Density);
        let frame = assembler.assemble(
            0,
            &FrameMeasurements {
                motion: MotionSample {
                    energy: 1.875,
                    field: Some(field),
                },
                density: DensityEstimate {
                    count: 8.0,
                    map: Some(Array2::from_elem((16, 32), 8.0 / 512.0)),
                },
                identity: IdentitySnapshot::default(),
            },
        );
        assert!((frame.risk.score(10.0) - 60.0).abs() < 1e-3, "{}", frame.risk.score(10.0));
    }
}
