//! Pretrained temporal panic model.

use std::path::Path;
use std::sync::Mutex;

use crowdwatch_models::FEATURE_CHANNELS;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::info;

use crate::error::{InferenceError, InferenceResult};
use crate::normalize::NormalizedWindow;

/// Default location of the exported sequence model.
pub const DEFAULT_SEQUENCE_MODEL: &str = "models/sequence/panic_lstm.onnx";

/// Inference-only model mapping a normalized `W×2` window to a probability.
pub trait SequenceModel: Send + Sync {
    /// Window length the model was trained on.
    fn window_size(&self) -> usize;

    fn predict(&self, window: &NormalizedWindow) -> InferenceResult<f64>;
}

/// ONNX export of the LSTM, input `[1, W, 2]`, output one sigmoid value.
pub struct OnnxSequenceModel {
    session: Mutex<Session>,
    output_name: String,
    window_size: usize,
}

impl OnnxSequenceModel {
    /// Load the model once; fails with `ModelUnavailable` for missing or
    /// corrupt weights.
    pub fn load(model_path: &Path, window_size: usize) -> InferenceResult<Self> {
        if !model_path.exists() {
            return Err(InferenceError::model_unavailable(format!(
                "sequence model not found at {}",
                model_path.display()
            )));
        }
        let model_bytes = std::fs::read(model_path).map_err(|e| {
            InferenceError::model_unavailable(format!("Failed to read model file: {e}"))
        })?;

        let session = Session::builder()
            .map_err(|e| InferenceError::model_unavailable(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError::model_unavailable(format!("Failed to set optimization level: {e}")))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| InferenceError::model_unavailable(format!("Failed to load ONNX model: {e}")))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| InferenceError::model_unavailable("sequence model declares no outputs"))?;

        info!(
            model = %model_path.display(),
            window_size,
            output = %output_name,
            "Loaded sequence model"
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            window_size,
        })
    }
}

impl SequenceModel for OnnxSequenceModel {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn predict(&self, window: &NormalizedWindow) -> InferenceResult<f64> {
        if window.len() != self.window_size {
            return Err(InferenceError::malformed_window(format!(
                "model expects {} steps, got {}",
                self.window_size,
                window.len()
            )));
        }

        let shape = vec![1usize, self.window_size, FEATURE_CHANNELS];
        let input: Value = Tensor::from_array((shape, window.to_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| InferenceError::numeric(format!("Failed to create tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::numeric("Session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| InferenceError::numeric(format!("ONNX inference failed: {e}")))?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| InferenceError::numeric("Missing sequence output tensor"))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::numeric(format!("Failed to extract tensor: {e}")))?;

        let p = data
            .first()
            .copied()
            .ok_or_else(|| InferenceError::numeric("empty model output"))? as f64;
        check_probability(p)
    }
}

/// Accept only finite values in `[0, 1]`.
pub fn check_probability(p: f64) -> InferenceResult<f64> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(InferenceError::numeric(format!(
            "model output {p} is not a probability"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_probability() {
        assert_eq!(check_probability(0.3).unwrap(), 0.3);
        assert!(check_probability(f64::NAN).is_err());
        assert!(check_probability(1.2).is_err());
        assert!(check_probability(-0.1).is_err());
    }

    #[test]
    fn test_missing_model_is_unavailable() {
        assert!(matches!(
            OnnxSequenceModel::load(Path::new("/nonexistent/panic_lstm.onnx"), 30),
            Err(InferenceError::ModelUnavailable(_))
        ));
    }

    #[test]
    #[ignore = "requires the exported sequence model"]
    fn test_exported_model_answers_probability() {
        use crate::normalize::Normalizer;
        use crate::window::SlidingWindow;
        use crowdwatch_models::FeatureVector;

        let model = OnnxSequenceModel::load(Path::new(DEFAULT_SEQUENCE_MODEL), 30).unwrap();
        let window = SlidingWindow::new(
            (0..30)
                .map(|t| FeatureVector::new(t, t as f64 / 3.0, (t % 4) as f64))
                .collect(),
        );
        let normalized = Normalizer::default().normalize(&window).unwrap();
        let p = model.predict(&normalized).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }
}
