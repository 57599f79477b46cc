//! Farnebäck dense flow through OpenCV.

use ndarray::Array2;
use opencv::core::Mat;
use opencv::video;

use crate::cv;
use crate::error::{MediaError, MediaResult};

/// `calcOpticalFlowFarneback` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FarnebackFlow {
    pub pyr_scale: f64,
    pub levels: i32,
    pub win_size: i32,
    pub iterations: i32,
    pub poly_n: i32,
    pub poly_sigma: f64,
}

impl Default for FarnebackFlow {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl FarnebackFlow {
    /// Per-pixel `(dx, dy)` flow between two equally sized 8-bit matrices,
    /// each shaped `(rows, cols)`.
    pub fn compute(&self, previous: &Mat, current: &Mat) -> MediaResult<(Array2<f32>, Array2<f32>)> {
        let mut flow = Mat::default();
        video::calc_optical_flow_farneback(
            previous,
            current,
            &mut flow,
            self.pyr_scale,
            self.levels,
            self.win_size,
            self.iterations,
            self.poly_n,
            self.poly_sigma,
            0,
        )
        .map_err(|e| MediaError::motion_failed(format!("Farneback flow failed: {e}")))?;

        cv::flow_components(&flow)
            .map_err(|e| MediaError::motion_failed(format!("Failed to read flow: {e}")))
    }
}
