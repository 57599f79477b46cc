//! Motion energy estimation.
//!
//! [`MotionEnergyEstimator`] keeps the previous grayscale frame of one stream
//! and turns each new frame into a non-negative motion scalar: the mean
//! Farnebäck flow magnitude above a noise floor. The first frame of a stream
//! (or the first frame after a resolution change) only initializes the
//! reference and yields exactly `0.0`.
//!
//! Energy is measured at the square analysis resolution. The density risk
//! score is calibrated on a fixed reference resolution instead, so
//! [`MotionField`] also carries the per-axis factor that rescales analysis
//! pixels to reference pixels.

mod farneback;

use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::{Array2, Zip};
use opencv::core::{self, Mat};
use opencv::imgproc;
use tracing::debug;

use crate::cv;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

pub use farneback::FarnebackFlow;

/// Motion estimator settings.
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// Frames are resized to `analysis_size`×`analysis_size` before flow.
    pub analysis_size: u32,
    /// Magnitudes at or below this value are treated as noise.
    pub noise_floor: f32,
    /// Resolution the density risk bands are calibrated on.
    pub risk_width: u32,
    pub risk_height: u32,
    pub flow: FarnebackFlow,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            analysis_size: 320,
            noise_floor: 2.0,
            risk_width: 1024,
            risk_height: 576,
            flow: FarnebackFlow::default(),
        }
    }
}

/// Flow field of one frame pair at analysis resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionField {
    dx: Array2<f32>,
    dy: Array2<f32>,
    risk_scale: (f32, f32),
}

impl MotionField {
    /// Field from per-pixel flow components, both shaped `(height, width)`.
    pub fn new(dx: Array2<f32>, dy: Array2<f32>) -> Self {
        Self {
            dx,
            dy,
            risk_scale: (1.0, 1.0),
        }
    }

    /// Set the reference pixels per analysis pixel along x and y.
    pub fn with_risk_scale(mut self, x: f32, y: f32) -> Self {
        self.risk_scale = (x, y);
        self
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dx.dim()
    }

    /// Flow magnitude in analysis pixels.
    pub fn magnitudes(&self) -> Array2<f32> {
        self.scaled_magnitudes(1.0, 1.0)
    }

    /// Flow magnitude in reference-resolution pixels.
    pub fn risk_magnitudes(&self) -> Array2<f32> {
        self.scaled_magnitudes(self.risk_scale.0, self.risk_scale.1)
    }

    fn scaled_magnitudes(&self, sx: f32, sy: f32) -> Array2<f32> {
        Zip::from(&self.dx)
            .and(&self.dy)
            .map_collect(|x, y| ((x * sx).powi(2) + (y * sy).powi(2)).sqrt())
    }

    /// Mean of magnitudes strictly above `noise_floor`, 0 when none qualify.
    pub fn energy(&self, noise_floor: f32) -> f64 {
        let (sum, count) = self
            .magnitudes()
            .iter()
            .filter(|m| **m > noise_floor)
            .fold((0.0f64, 0usize), |(s, c), m| (s + *m as f64, c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Sum of reference-scale magnitude × density, with the field resampled
    /// onto the density grid.
    pub fn density_weighted_sum(&self, density: &Array2<f32>) -> f64 {
        let (h, w) = density.dim();
        if h == 0 || w == 0 {
            return 0.0;
        }
        let resampled = resample(&self.risk_magnitudes(), h, w);
        resampled
            .iter()
            .zip(density.iter())
            .map(|(m, d)| *m as f64 * (*d).max(0.0) as f64)
            .sum()
    }

    /// Sum of reference-scale magnitude with `count` spread uniformly over
    /// the field.
    pub fn uniform_weighted_sum(&self, count: f64) -> f64 {
        let magnitudes = self.risk_magnitudes();
        if magnitudes.is_empty() {
            return 0.0;
        }
        let weight = count.max(0.0) / magnitudes.len() as f64;
        magnitudes.iter().map(|m| *m as f64 * weight).sum()
    }
}

/// Nearest-neighbour resample to `(height, width)`.
fn resample(field: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (src_h, src_w) = field.dim();
    if (src_h, src_w) == (height, width) {
        return field.clone();
    }
    Array2::from_shape_fn((height, width), |(y, x)| {
        let sy = ((y * src_h) / height.max(1)).min(src_h.saturating_sub(1));
        let sx = ((x * src_w) / width.max(1)).min(src_w.saturating_sub(1));
        field[[sy, sx]]
    })
}

/// One motion estimate.
#[derive(Debug, Clone)]
pub struct MotionSample {
    /// Non-negative motion energy.
    pub energy: f64,
    /// Flow field, `None` on warm-up frames.
    pub field: Option<MotionField>,
}

impl MotionSample {
    pub fn warm_up() -> Self {
        Self {
            energy: 0.0,
            field: None,
        }
    }
}

/// Stateful per-stream motion energy estimator.
pub struct MotionEnergyEstimator {
    config: MotionConfig,
    previous: Option<GrayImage>,
    previous_dims: (u32, u32),
}

impl MotionEnergyEstimator {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            previous: None,
            previous_dims: (0, 0),
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Whether a reference frame is stored.
    pub fn has_reference(&self) -> bool {
        self.previous.is_some()
    }

    /// Drop the reference frame; the next call is a warm-up again.
    pub fn reset(&mut self) {
        self.previous = None;
        self.previous_dims = (0, 0);
    }

    /// Estimate motion between the stored reference and `frame`.
    ///
    /// The frame always becomes the new reference, also when flow fails.
    pub fn estimate(&mut self, frame: &Frame) -> MediaResult<MotionSample> {
        let dims = (frame.width(), frame.height());
        let size = self.config.analysis_size.max(1);
        let current = imageops::resize(&frame.to_gray(), size, size, FilterType::Triangle);

        let previous = match self.previous.take() {
            Some(previous) if self.previous_dims == dims => previous,
            Some(_) => {
                debug!(
                    frame = frame.index,
                    from = ?self.previous_dims,
                    to = ?dims,
                    "Frame size changed, motion reference reset"
                );
                self.store(current, dims);
                return Ok(MotionSample::warm_up());
            }
            None => {
                self.store(current, dims);
                return Ok(MotionSample::warm_up());
            }
        };

        let result = self.flow(&previous, &current);
        self.store(current, dims);

        let (dx, dy) = result?;
        let field = MotionField::new(dx, dy).with_risk_scale(
            self.config.risk_width as f32 / size as f32,
            self.config.risk_height as f32 / size as f32,
        );
        let energy = field.energy(self.config.noise_floor);
        Ok(MotionSample {
            energy: if energy.is_finite() { energy } else { 0.0 },
            field: Some(field),
        })
    }

    fn flow(&self, previous: &GrayImage, current: &GrayImage) -> MediaResult<(Array2<f32>, Array2<f32>)> {
        let wrap = |gray: &GrayImage| {
            cv::gray_mat(gray)
                .map_err(|e| MediaError::motion_failed(format!("Failed to wrap frame: {e}")))
        };
        self.config.flow.compute(&wrap(previous)?, &wrap(current)?)
    }

    fn store(&mut self, gray: GrayImage, dims: (u32, u32)) {
        self.previous = Some(gray);
        self.previous_dims = dims;
    }
}

/// Single-frame motion proxy: mean absolute Laplacian of the grayscale image.
pub fn edge_energy(gray: &GrayImage) -> MediaResult<f64> {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Ok(0.0);
    }
    let failed = |e: opencv::Error| MediaError::motion_failed(format!("Edge energy failed: {e}"));

    let src = cv::gray_mat(gray).map_err(failed)?;
    let mut laplacian = Mat::default();
    imgproc::laplacian_def(&src, &mut laplacian, core::CV_64F).map_err(failed)?;
    let total = core::norm(&laplacian, core::NORM_L1, &core::no_array()).map_err(failed)?;
    Ok(total / (w as f64 * h as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn textured(width: u32, height: u32, shift: f32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let xf = x as f32 - shift;
            let v = 128.0 + 50.0 * (xf / 9.0).sin() + 50.0 * (y as f32 / 11.0).cos();
            let v = v.clamp(0.0, 255.0) as u8;
            Rgb([v, v, v])
        })
    }

    fn frame(index: u64, image: RgbImage) -> Frame {
        Frame::new(index, index * 33, image)
    }

    fn interior_mean(field: &Array2<f32>) -> f64 {
        let (h, w) = field.dim();
        let (my, mx) = (h / 5, w / 5);
        let inner = field.slice(ndarray::s![my..h - my, mx..w - mx]);
        inner.iter().map(|v| *v as f64).sum::<f64>() / inner.len() as f64
    }

    #[test]
    fn test_first_frame_is_exactly_zero() {
        let mut estimator = MotionEnergyEstimator::new(MotionConfig::default());
        let sample = estimator.estimate(&frame(0, textured(64, 48, 0.0))).unwrap();
        assert_eq!(sample.energy, 0.0);
        assert!(sample.field.is_none());
        assert!(estimator.has_reference());
    }

    #[test]
    fn test_static_scene_has_no_energy() {
        let mut estimator = MotionEnergyEstimator::new(MotionConfig::default());
        estimator.estimate(&frame(0, textured(64, 48, 0.0))).unwrap();
        let sample = estimator.estimate(&frame(1, textured(64, 48, 0.0))).unwrap();
        assert_eq!(sample.energy, 0.0);
        assert!(sample.field.is_some());
    }

    #[test]
    fn test_moving_scene_has_energy() {
        let config = MotionConfig {
            noise_floor: 0.0,
            ..MotionConfig::default()
        };
        let mut estimator = MotionEnergyEstimator::new(config);
        estimator.estimate(&frame(0, textured(320, 320, 0.0))).unwrap();
        let sample = estimator.estimate(&frame(1, textured(320, 320, 2.0))).unwrap();
        assert!(sample.energy > 0.5, "energy {}", sample.energy);
    }

    #[test]
    fn test_size_change_resets_reference() {
        let mut estimator = MotionEnergyEstimator::new(MotionConfig::default());
        estimator.estimate(&frame(0, textured(64, 48, 0.0))).unwrap();
        let sample = estimator.estimate(&frame(1, textured(80, 60, 5.0))).unwrap();
        assert_eq!(sample.energy, 0.0);
        assert!(sample.field.is_none());

        estimator.reset();
        assert!(!estimator.has_reference());
    }

    #[test]
    fn test_field_energy_and_weighting() {
        let dx = Array2::from_shape_vec((2, 2), vec![1.0, 3.0, 5.0, 0.0]).unwrap();
        let field = MotionField::new(dx, Array2::zeros((2, 2)));
        assert_eq!(field.energy(2.0), 4.0);
        assert_eq!(field.energy(10.0), 0.0);

        let density = Array2::from_elem((1, 1), 2.0f32);
        // top-left sample of the 2x2 field weighted by the single cell
        assert_eq!(field.density_weighted_sum(&density), 2.0);
        assert_eq!(field.uniform_weighted_sum(4.0), 9.0);
    }

    #[test]
    fn test_risk_magnitude_is_independent_of_analysis_size() {
        // a 6px shift at 1024x576 seen through two analysis sizes
        for (size, shift) in [(320.0f32, 1.875f32), (640.0, 3.75)] {
            let n = size as usize;
            let field = MotionField::new(Array2::from_elem((n, n), shift), Array2::zeros((n, n)))
                .with_risk_scale(1024.0 / size, 576.0 / size);

            assert!((field.energy(0.0) - shift as f64).abs() < 1e-4);
            let density = Array2::from_elem((4, 4), 0.25f32);
            let per_person = field.density_weighted_sum(&density) / 4.0;
            assert!((per_person - 6.0).abs() < 1e-4, "size {size}: {per_person}");
        }
    }

    #[test]
    fn test_estimated_risk_scale_matches_reference_shift() {
        let shifted = |shift| frame(1, textured(1024, 576, shift));
        let mut means = Vec::new();
        for analysis_size in [320, 640] {
            let mut estimator = MotionEnergyEstimator::new(MotionConfig {
                analysis_size,
                ..MotionConfig::default()
            });
            estimator.estimate(&shifted(0.0)).unwrap();
            let sample = estimator.estimate(&shifted(6.0)).unwrap();
            let field = sample.field.unwrap();
            means.push(interior_mean(&field.risk_magnitudes()));
        }

        for mean in &means {
            assert!((4.5..7.5).contains(mean), "risk magnitudes {means:?}");
        }
        assert!((means[0] / means[1] - 1.0).abs() < 0.2, "risk magnitudes {means:?}");
    }

    #[test]
    fn test_edge_energy() {
        let flat = GrayImage::from_pixel(10, 10, Luma([90]));
        assert_eq!(edge_energy(&flat).unwrap(), 0.0);

        let mut dot = GrayImage::from_pixel(5, 5, Luma([0]));
        dot.put_pixel(2, 2, Luma([10]));
        // centre contributes 40, its four neighbours 10 each
        assert!((edge_energy(&dot).unwrap() - 80.0 / 25.0).abs() < 1e-9);
    }
}
