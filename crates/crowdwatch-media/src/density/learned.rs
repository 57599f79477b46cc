//! Density-regression network run through ONNX Runtime.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use super::{DensityEstimate, DensityEstimator};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Longest input side fed to the network; larger frames are downscaled.
const MAX_INPUT_SIDE: u32 = 1024;

/// Learned density estimator: `count = Σ density map`.
pub struct LearnedDensity {
    session: Mutex<Session>,
    output_name: String,
    max_input_side: u32,
}

impl LearnedDensity {
    /// Load weights from an ONNX file.
    pub fn load(model_path: &Path) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(MediaError::model_unavailable(format!(
                "density weights not found at {}",
                model_path.display()
            )));
        }
        let model_bytes = std::fs::read(model_path).map_err(|e| {
            MediaError::model_unavailable(format!("Failed to read model file: {e}"))
        })?;

        let session = Session::builder()
            .map_err(|e| MediaError::model_unavailable(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| MediaError::model_unavailable(format!("Failed to set optimization level: {e}")))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| MediaError::model_unavailable(format!("Failed to load ONNX model: {e}")))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| MediaError::model_unavailable("density model declares no outputs"))?;

        info!(model = %model_path.display(), output = %output_name, "Loaded density model");

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            max_input_side: MAX_INPUT_SIDE,
        })
    }

    /// ImageNet-normalized NCHW tensor.
    fn preprocess(&self, frame: &Frame) -> MediaResult<Value> {
        let (mut w, mut h) = (frame.width(), frame.height());
        let longest = w.max(h);
        let rgb = if longest > self.max_input_side {
            let scale = self.max_input_side as f32 / longest as f32;
            w = ((w as f32 * scale).round() as u32).max(1);
            h = ((h as f32 * scale).round() as u32).max(1);
            DynamicImage::ImageRgb8(frame.image.clone())
                .resize_exact(w, h, FilterType::Triangle)
                .to_rgb8()
        } else {
            frame.image.clone()
        };

        let (w, h) = (w as usize, h as usize);
        let mut chw = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let value = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
                    chw.push((value - IMAGENET_MEAN[c]) / IMAGENET_STD[c]);
                }
            }
        }

        Tensor::from_array((vec![1usize, 3, h, w], chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::inference_failed(format!("Failed to create tensor: {e}")))
    }
}

impl DensityEstimator for LearnedDensity {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn estimate(&self, frame: &Frame) -> MediaResult<DensityEstimate> {
        let input = self.preprocess(frame)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::inference_failed("Session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::inference_failed(format!("ONNX inference failed: {e}")))?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| MediaError::inference_failed("Missing density output tensor"))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::inference_failed(format!("Failed to extract tensor: {e}")))?;

        // [1, 1, H, W] or [1, H, W]: the last two axes are spatial
        let dims: Vec<usize> = shape.iter().map(|d| (*d).max(0) as usize).collect();
        let (mh, mw) = match dims.as_slice() {
            [.., h, w] => (*h, *w),
            _ => (1, data.len()),
        };
        if mh * mw != data.len() {
            return Err(MediaError::inference_failed(format!(
                "Unexpected density output shape {dims:?}"
            )));
        }

        let map = Array2::from_shape_vec((mh, mw), data.to_vec())
            .map_err(|e| MediaError::inference_failed(format!("Failed to reshape output: {e}")))?;
        if map.iter().any(|v| !v.is_finite()) {
            return Err(MediaError::inference_failed("density map contains NaN"));
        }

        let count: f64 = map.iter().map(|v| *v as f64).sum();
        debug!(frame = frame.index, count, "Learned density estimate");

        Ok(DensityEstimate {
            count: if count > 0.0 { count } else { 0.0 },
            map: Some(map),
        })
    }
}
