//! Sequence classifier adapter.
//!
//! Wraps a [`SequenceBackend`] and guarantees a well-formed
//! [`SequenceVerdict`] for every completed window: validation errors,
//! backend failures, numeric problems and timeouts all become the neutral
//! safe default with an error flag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crowdwatch_models::{SequenceVerdict, DEFAULT_WINDOW_SIZE};
use tracing::{debug, warn};

use crate::backend::SequenceBackend;
use crate::error::{InferenceError, InferenceResult};
use crate::model::check_probability;
use crate::window::SlidingWindow;

/// Classifier settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub window_size: usize,
    /// `panic_detected = p > decision_threshold`.
    pub decision_threshold: f64,
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            decision_threshold: 0.5,
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Invocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierCounters {
    pub invocations: u64,
    pub failures: u64,
    pub timeouts: u64,
}

pub struct SequenceClassifier {
    backend: Arc<dyn SequenceBackend>,
    config: ClassifierConfig,
    invocations: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
}

impl SequenceClassifier {
    pub fn new(backend: Arc<dyn SequenceBackend>, config: ClassifierConfig) -> Self {
        Self {
            backend,
            config,
            invocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn counters(&self) -> ClassifierCounters {
        ClassifierCounters {
            invocations: self.invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Classify a window, surfacing the failure cause.
    pub async fn try_classify(
        &self,
        window: &SlidingWindow,
        window_seq: u64,
    ) -> InferenceResult<SequenceVerdict> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let result = self.run(window).await;
        match &result {
            Err(e) if e.is_timeout() => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {}
        }

        let p = result?;
        debug!(window_seq, confidence = p, backend = self.backend.name(), "Sequence verdict");
        Ok(SequenceVerdict::from_probability(
            window_seq,
            window.end_timestamp(),
            p,
            self.config.decision_threshold,
        ))
    }

    /// Classify a window; never fails.
    pub async fn classify(&self, window: &SlidingWindow, window_seq: u64) -> SequenceVerdict {
        match self.try_classify(window, window_seq).await {
            Ok(verdict) => verdict,
            Err(e) => self.fallback(window, window_seq, &e),
        }
    }

    /// Safe default verdict for a failed window.
    pub fn fallback(
        &self,
        window: &SlidingWindow,
        window_seq: u64,
        error: &InferenceError,
    ) -> SequenceVerdict {
        warn!(
            window_seq,
            backend = self.backend.name(),
            error = %error,
            "Sequence inference failed, using safe default"
        );
        SequenceVerdict::safe_default(
            window_seq,
            window.end_timestamp(),
            self.config.decision_threshold,
            error.to_string(),
        )
    }

    async fn run(&self, window: &SlidingWindow) -> InferenceResult<f64> {
        window.validate(self.config.window_size)?;
        let p = tokio::time::timeout(self.config.timeout, self.backend.predict(window))
            .await
            .map_err(|_| InferenceError::Timeout(self.config.timeout))??;
        check_probability(p)
    }
}
