//! Model-free blob counting.

use image::GrayImage;
use opencv::core::{Mat, Point, Size, Vector};
use opencv::imgproc;

use super::{DensityEstimate, DensityEstimator};
use crate::cv;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Gaussian blur, binarize, count outer contours.
#[derive(Debug, Clone)]
pub struct GeometricDensity {
    /// Odd Gaussian kernel side; 0 or 1 disables blurring.
    pub blur_kernel: i32,
    /// Pixels strictly above this value are foreground.
    pub threshold: u8,
}

impl Default for GeometricDensity {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            threshold: 127,
        }
    }
}

impl GeometricDensity {
    /// Count blobs of a grayscale image.
    ///
    /// Blobs nested inside the hole of another blob are not counted.
    pub fn count_blobs(&self, gray: &GrayImage) -> MediaResult<usize> {
        let failed =
            |e: opencv::Error| MediaError::inference_failed(format!("Blob counting failed: {e}"));

        let src = cv::gray_mat(gray).map_err(failed)?;
        let blurred = if self.blur_kernel > 1 {
            let mut blurred = Mat::default();
            imgproc::gaussian_blur_def(
                &src,
                &mut blurred,
                Size::new(self.blur_kernel, self.blur_kernel),
                0.0,
            )
            .map_err(failed)?;
            blurred
        } else {
            src
        };

        let mut mask = Mat::default();
        imgproc::threshold(
            &blurred,
            &mut mask,
            self.threshold as f64,
            255.0,
            imgproc::THRESH_BINARY,
        )
        .map_err(failed)?;

        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours_def(
            &mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
        )
        .map_err(failed)?;
        Ok(contours.len())
    }
}

impl DensityEstimator for GeometricDensity {
    fn name(&self) -> &'static str {
        "geometric"
    }

    fn estimate(&self, frame: &Frame) -> MediaResult<DensityEstimate> {
        Ok(DensityEstimate::count(
            self.count_blobs(&frame.to_gray())? as f64,
        ))
    }
}
