//! Windowed-inference request handling for the `crowdwatch-infer` worker.

use crowdwatch_models::{WindowRequest, WindowResponse};

use crate::error::{InferenceError, InferenceResult};
use crate::model::{check_probability, SequenceModel};
use crate::normalize::Normalizer;
use crate::window::SlidingWindow;

/// Answer one raw window.
pub fn answer_window(
    model: &dyn SequenceModel,
    normalizer: &Normalizer,
    threshold: f64,
    window: &SlidingWindow,
) -> InferenceResult<WindowResponse> {
    window.validate(model.window_size())?;
    let normalized = normalizer.normalize(window)?;
    let confidence = check_probability(model.predict(&normalized)?)?;
    Ok(WindowResponse {
        panic_detected: confidence > threshold,
        confidence,
        threshold,
    })
}

/// Validate a request against the expected window length.
///
/// Runs before any model is loaded so malformed input is reported as such.
pub fn parse_request(request: &WindowRequest, window_size: usize) -> InferenceResult<SlidingWindow> {
    let window = SlidingWindow::from_request(request)?;
    window.validate(window_size)?;
    Ok(window)
}

/// Parse the JSON body read from standard input.
pub fn parse_request_json(body: &str) -> InferenceResult<WindowRequest> {
    if body.trim().is_empty() {
        return Err(InferenceError::malformed_window("empty request"));
    }
    Ok(serde_json::from_str(body)?)
}
