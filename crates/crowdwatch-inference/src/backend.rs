//! Sequence inference backends.
//!
//! A backend takes a raw (unnormalized) window and returns the model
//! probability. Normalization happens on the model side of the boundary, so
//! the in-process and out-of-process backends see identical inputs.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use crowdwatch_models::{WindowResponse, WindowResponseError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{InferenceError, InferenceResult};
use crate::model::{check_probability, SequenceModel};
use crate::normalize::Normalizer;
use crate::window::SlidingWindow;

#[async_trait]
pub trait SequenceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Panic probability of a raw window.
    async fn predict(&self, window: &SlidingWindow) -> InferenceResult<f64>;
}

/// In-process model, run on the blocking pool.
pub struct LocalBackend {
    model: Arc<dyn SequenceModel>,
    normalizer: Normalizer,
}

impl LocalBackend {
    pub fn new(model: Arc<dyn SequenceModel>, normalizer: Normalizer) -> Self {
        Self { model, normalizer }
    }
}

#[async_trait]
impl SequenceBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    async fn predict(&self, window: &SlidingWindow) -> InferenceResult<f64> {
        let normalized = self.normalizer.normalize(window)?;
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.predict(&normalized))
            .await
            .map_err(|e| InferenceError::numeric(format!("inference task failed: {e}")))?
    }
}

/// Out-of-process worker speaking the windowed-inference JSON protocol:
/// request on stdin, answer on stdout, safe default on stderr with a
/// non-zero exit status.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
}

impl ProcessBackend {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a command line on whitespace into program and arguments.
    pub fn from_command_line(command: &str) -> InferenceResult<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| InferenceError::config("empty inference worker command"))?;
        Ok(Self::new(program, parts))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SequenceBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn predict(&self, window: &SlidingWindow) -> InferenceResult<f64> {
        let payload = serde_json::to_vec(&window.to_request())?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InferenceError::process(format!("failed to start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // a worker may exit before reading its input; its answer decides
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = last_json_line(&stderr)
                .and_then(|line| serde_json::from_str::<WindowResponseError>(line).ok())
                .map(|e| e.error)
                .unwrap_or_else(|| format!("worker exited with {}", output.status));
            return Err(InferenceError::process(reason));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = last_json_line(&stdout)
            .ok_or_else(|| InferenceError::process("worker produced no answer"))?;
        let response: WindowResponse = serde_json::from_str(line)?;
        debug!(
            confidence = response.confidence,
            panic = response.panic_detected,
            "Inference worker answered"
        );
        check_probability(response.confidence)
    }
}

/// Last non-empty line that looks like a JSON object.
fn last_json_line(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .last()
}

/// Backend used when no sequence model is available: every call fails and
/// the classifier answers with its safe default.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SequenceBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn predict(&self, _window: &SlidingWindow) -> InferenceResult<f64> {
        Err(InferenceError::model_unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizedWindow;
    use crowdwatch_models::FeatureVector;

    /// Returns the sigmoid of the last normalized motion value.
    struct LastStepModel;

    impl SequenceModel for LastStepModel {
        fn window_size(&self) -> usize {
            3
        }

        fn predict(&self, window: &NormalizedWindow) -> InferenceResult<f64> {
            let last = window.data()[[window.len() - 1, 0]] as f64;
            Ok(1.0 / (1.0 + (-last).exp()))
        }
    }

    fn window(values: &[f64]) -> SlidingWindow {
        SlidingWindow::new(
            values
                .iter()
                .enumerate()
                .map(|(t, e)| FeatureVector::new(t as u64, *e, 0.0))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_local_backend_normalizes_before_model() {
        let backend = LocalBackend::new(Arc::new(LastStepModel), Normalizer::default());
        let rising = backend.predict(&window(&[0.0, 0.0, 9.0])).await.unwrap();
        let flat = backend.predict(&window(&[5.0, 5.0, 5.0])).await.unwrap();
        assert!(rising > 0.5);
        assert!((flat - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails() {
        let backend = UnavailableBackend::new("no weights");
        assert!(matches!(
            backend.predict(&window(&[1.0])).await,
            Err(InferenceError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_command_line_split() {
        let backend = ProcessBackend::from_command_line("crowdwatch-infer --model m.onnx").unwrap();
        assert_eq!(backend.program(), "crowdwatch-infer");
        assert_eq!(backend.args, vec!["--model", "m.onnx"]);
        assert!(ProcessBackend::from_command_line("  ").is_err());
    }

    #[test]
    fn test_last_json_line_skips_log_noise() {
        let text = "WARN something\n{\"a\":1}\n\n";
        assert_eq!(last_json_line(text), Some("{\"a\":1}"));
        assert_eq!(last_json_line("plain"), None);
    }
}
