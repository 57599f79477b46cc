//! Per-channel z-score normalization of a window.
//!
//! `x' = (x - mean) / (std + epsilon)` with population standard deviation.
//! The epsilon floor keeps constant channels at zero instead of
//! dividing by zero.

use std::fmt;

use crowdwatch_models::FEATURE_CHANNELS;
use ndarray::Array2;

use crate::error::{InferenceError, InferenceResult};
use crate::window::SlidingWindow;

/// Epsilon added to the standard deviation.
pub const NORMALIZATION_EPSILON: f64 = 1e-7;

/// Where the normalization statistics come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizationRegime {
    /// Statistics of the window being normalized.
    Window,
    /// Fixed per-channel statistics, `[motion_energy, flux_of_count]`.
    Global {
        mean: [f64; FEATURE_CHANNELS],
        std: [f64; FEATURE_CHANNELS],
    },
}

impl Default for NormalizationRegime {
    fn default() -> Self {
        Self::Window
    }
}

impl fmt::Display for NormalizationRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window => f.write_str("window"),
            Self::Global { mean, std } => write!(
                f,
                "global(mean_e={}, std_e={}, mean_f={}, std_f={})",
                mean[0], std[0], mean[1], std[1]
            ),
        }
    }
}

impl NormalizationRegime {
    /// Parse a regime name plus, for `global`, a
    /// `mean_e,std_e,mean_f,std_f` statistics string.
    pub fn parse(kind: &str, stats: Option<&str>) -> InferenceResult<Self> {
        match kind.trim().to_lowercase().as_str() {
            "window" => Ok(Self::Window),
            "global" => {
                let stats = stats.ok_or_else(|| {
                    InferenceError::config("global normalization requires statistics")
                })?;
                let values: Vec<f64> = stats
                    .split(',')
                    .map(|s| s.trim().parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|e| InferenceError::config(format!("invalid statistics: {e}")))?;
                match values.as_slice() {
                    [mean_e, std_e, mean_f, std_f]
                        if values.iter().all(|v| v.is_finite()) && *std_e >= 0.0 && *std_f >= 0.0 =>
                    {
                        Ok(Self::Global {
                            mean: [*mean_e, *mean_f],
                            std: [*std_e, *std_f],
                        })
                    }
                    _ => Err(InferenceError::config(
                        "expected mean_e,std_e,mean_f,std_f with non-negative std",
                    )),
                }
            }
            other => Err(InferenceError::config(format!(
                "unknown normalization regime '{other}'"
            ))),
        }
    }
}

/// Normalized window shaped `(W, 2)`, ready for the sequence model.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWindow {
    data: Array2<f32>,
}

impl NormalizedWindow {
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Row-major values, time-major then channel.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Z-score normalizer.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    regime: NormalizationRegime,
}

impl Normalizer {
    pub fn new(regime: NormalizationRegime) -> Self {
        Self { regime }
    }

    pub fn regime(&self) -> &NormalizationRegime {
        &self.regime
    }

    pub fn normalize(&self, window: &SlidingWindow) -> InferenceResult<NormalizedWindow> {
        if window.is_empty() {
            return Err(InferenceError::malformed_window("empty window"));
        }

        let rows = window.len();
        let mut data = Array2::<f32>::zeros((rows, FEATURE_CHANNELS));
        for channel in 0..FEATURE_CHANNELS {
            let values = window.channel(channel);
            let (mean, std) = match self.regime {
                NormalizationRegime::Window => mean_std(&values),
                NormalizationRegime::Global { mean, std } => (mean[channel], std[channel]),
            };
            let denom = std + NORMALIZATION_EPSILON;
            for (row, value) in values.iter().enumerate() {
                let z = (value - mean) / denom;
                if !z.is_finite() {
                    return Err(InferenceError::numeric(format!(
                        "non-finite normalized value at row {row}, channel {channel}"
                    )));
                }
                data[[row, channel]] = z as f32;
            }
        }
        Ok(NormalizedWindow { data })
    }
}

/// Mean and population standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdwatch_models::FeatureVector;

    fn window(values: &[(f64, f64)]) -> SlidingWindow {
        SlidingWindow::new(
            values
                .iter()
                .enumerate()
                .map(|(t, (e, f))| FeatureVector::new(t as u64, *e, *f))
                .collect(),
        )
    }

    #[test]
    fn test_constant_window_normalizes_to_zero() {
        let w = window(&[(4.2, 7.0); 30]);
        let normalized = Normalizer::default().normalize(&w).unwrap();
        assert_eq!(normalized.len(), 30);
        assert!(normalized.to_vec().iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_window_regime_zero_mean_unit_std() {
        let w = window(&[(1.0, 10.0), (2.0, 20.0), (3.0, 30.0), (4.0, 40.0)]);
        let normalized = Normalizer::default().normalize(&w).unwrap();
        for channel in 0..2 {
            let column = normalized.data().column(channel);
            let mean: f32 = column.iter().sum::<f32>() / 4.0;
            let var: f32 = column.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-5);
            assert!((var.sqrt() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_global_regime_uses_fixed_stats() {
        let regime = NormalizationRegime::parse("global", Some("2.0, 1.0, 10.0, 5.0")).unwrap();
        let w = window(&[(3.0, 20.0)]);
        let normalized = Normalizer::new(regime).normalize(&w).unwrap();
        let values = normalized.to_vec();
        assert!((values[0] - 1.0).abs() < 1e-5);
        assert!((values[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_regime_parse_errors() {
        assert_eq!(
            NormalizationRegime::parse("Window", None).unwrap(),
            NormalizationRegime::Window
        );
        assert!(NormalizationRegime::parse("global", None).is_err());
        assert!(NormalizationRegime::parse("global", Some("1,2,3")).is_err());
        assert!(NormalizationRegime::parse("global", Some("1,-2,3,4")).is_err());
        assert!(NormalizationRegime::parse("minmax", None).is_err());
    }

    #[test]
    fn test_empty_window_is_malformed() {
        assert!(matches!(
            Normalizer::default().normalize(&SlidingWindow::default()),
            Err(InferenceError::MalformedWindow(_))
        ));
    }
}
