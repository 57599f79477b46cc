//! Per-frame crowd density estimation.
//!
//! Two strategies share the [`DensityEstimator`] contract:
//! - [`GeometricDensity`]: blur, binarize and count outer contours. Fast and
//!   model-free.
//! - [`LearnedDensity`]: spatial sum of a density-regression network run
//!   through ONNX Runtime. Also returns the density map.
//!
//! The strategy is picked once at startup through [`build_density_estimator`].

mod geometric;
mod learned;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array2;
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

pub use geometric::GeometricDensity;
pub use learned::LearnedDensity;

/// Default location of the learned density weights.
pub const DEFAULT_DENSITY_MODEL: &str = "models/density/csrnet.onnx";

/// Density of one frame.
#[derive(Debug, Clone, Default)]
pub struct DensityEstimate {
    /// Non-negative count estimate.
    pub count: f64,
    /// Per-cell density, when the strategy produces one.
    pub map: Option<Array2<f32>>,
}

impl DensityEstimate {
    pub fn count(count: f64) -> Self {
        Self {
            count: sanitize(count),
            map: None,
        }
    }
}

/// Frame → non-negative density scalar.
pub trait DensityEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(&self, frame: &Frame) -> MediaResult<DensityEstimate>;
}

/// Deployment-time density strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DensityStrategy {
    Geometric,
    Learned { model_path: PathBuf },
}

impl Default for DensityStrategy {
    fn default() -> Self {
        Self::Geometric
    }
}

impl DensityStrategy {
    pub fn learned(model_path: impl Into<PathBuf>) -> Self {
        Self::Learned {
            model_path: model_path.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geometric => "geometric",
            Self::Learned { .. } => "learned",
        }
    }
}

impl fmt::Display for DensityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DensityStrategy {
    type Err = MediaError;

    /// Parses the strategy name; `learned` uses [`DEFAULT_DENSITY_MODEL`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "geometric" => Ok(Self::Geometric),
            "learned" => Ok(Self::learned(DEFAULT_DENSITY_MODEL)),
            other => Err(MediaError::InvalidSource(format!(
                "unknown density strategy '{other}'"
            ))),
        }
    }
}

/// Build the configured estimator.
///
/// When the learned weights cannot be loaded and `require_models` is false,
/// the geometric strategy is returned instead and a warning is logged.
pub fn build_density_estimator(
    strategy: &DensityStrategy,
    require_models: bool,
) -> MediaResult<Arc<dyn DensityEstimator>> {
    match strategy {
        DensityStrategy::Geometric => {
            info!(strategy = "geometric", "Density estimator ready");
            Ok(Arc::new(GeometricDensity::default()))
        }
        DensityStrategy::Learned { model_path } => match LearnedDensity::load(model_path) {
            Ok(model) => {
                info!(strategy = "learned", model = %model_path.display(), "Density estimator ready");
                Ok(Arc::new(model))
            }
            Err(e) if !require_models => {
                warn!(
                    model = %model_path.display(),
                    error = %e,
                    "DENSITY MODEL UNAVAILABLE, falling back to geometric density"
                );
                Ok(Arc::new(GeometricDensity::default()))
            }
            Err(e) => Err(e),
        },
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
