//! End-to-end behaviour of a stream session over synthetic feature ramps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use crowdwatch_inference::{
    ClassifierConfig, InferenceResult, SequenceBackend, SequenceClassifier, SlidingWindow,
};
use crowdwatch_media::{
    DensityEstimate, DensityEstimator, Frame, GeometricDensity, MediaError, MediaResult,
};
use crowdwatch_models::{FeatureVector, VerdictLabel, NEUTRAL_CONFIDENCE};
use image::{Rgb, RgbImage};
use crowdwatch_pipeline::{
    AssembledFrame, PipelineConfig, RiskInput, SessionModels, StreamSession,
};

/// Counts calls and answers a fixed probability.
struct FixedBackend {
    calls: Arc<AtomicUsize>,
    probability: f64,
}

#[async_trait]
impl SequenceBackend for FixedBackend {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn predict(&self, _window: &SlidingWindow) -> InferenceResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probability)
    }
}

fn session(config: &PipelineConfig, probability: f64) -> (StreamSession, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let classifier = SequenceClassifier::new(
        Arc::new(FixedBackend {
            calls: calls.clone(),
            probability,
        }),
        ClassifierConfig {
            window_size: config.window_size,
            decision_threshold: config.decision_threshold,
            timeout: config.sequence_timeout,
        },
    );
    let models = SessionModels::new(
        Arc::new(GeometricDensity::default()),
        Some(Arc::new(classifier)),
    );
    (StreamSession::new("ramp", "synthetic", config, &models), calls)
}

fn frame(t: u64, energy: f64, flux: f64) -> AssembledFrame {
    AssembledFrame {
        features: FeatureVector::new(t, energy, flux),
        risk: RiskInput::default(),
        unique_count: 0,
    }
}

#[tokio::test]
async fn test_energy_ramp_warns_and_fires_sequence_once() {
    let config = PipelineConfig::default();
    let (mut session, calls) = session(&config, 0.2);

    let mut records = Vec::new();
    for t in 0..30u64 {
        let energy = 10.0 * t as f64 / 29.0;
        let outcome = session.process_features(t, t * 33, frame(t, energy, 0.0)).await;
        records.push((energy, outcome.telemetry));
    }

    for (energy, record) in &records {
        let expected = if *energy > 3.5 {
            VerdictLabel::WarningHighSpeed
        } else {
            VerdictLabel::Normal
        };
        assert_eq!(record.label, expected, "energy {energy}");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let fired: Vec<u64> = records
        .iter()
        .filter(|(_, r)| r.sequence.is_some())
        .map(|(_, r)| r.frame_index)
        .collect();
    assert_eq!(fired, vec![29]);

    let verdict = records[29].1.sequence.clone().unwrap();
    assert_eq!(verdict.window_seq, 1);
    assert_eq!(verdict.end_timestamp, 29);
    assert!(!verdict.panic_detected);
    assert_eq!(records[29].1.score, 0.2);

    let summary = session.finish().await;
    assert_eq!(summary.total_frames, 30);
    assert_eq!(summary.stats.sequence_invocations, 1);
    assert_eq!(summary.stats.status_transitions, 1);
    assert_eq!(summary.final_status.label, VerdictLabel::WarningHighSpeed);
}

#[tokio::test]
async fn test_sequence_fires_every_stride() {
    let config = PipelineConfig {
        window_size: 10,
        sequence_stride: 5,
        ..PipelineConfig::default()
    };
    let (mut session, calls) = session(&config, 0.1);

    let mut fired = Vec::new();
    for t in 0..30u64 {
        let outcome = session.process_features(t, t * 33, frame(t, 1.0, 0.0)).await;
        if outcome.telemetry.sequence.is_some() {
            fired.push(t);
        }
    }
    assert_eq!(fired, vec![9, 14, 19, 24, 29]);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_single_panic_frame_does_not_flip_status() {
    let config = PipelineConfig {
        hysteresis_frames: 2,
        ..PipelineConfig::default()
    };
    let (mut session, _) = session(&config, 0.1);

    let inputs = [(1.0, 0.0), (1.0, 0.0), (8.0, 20.0), (1.0, 0.0), (1.0, 0.0)];
    let mut labels = Vec::new();
    let mut alerts = 0;
    for (t, (energy, flux)) in inputs.into_iter().enumerate() {
        let outcome = session
            .process_features(t as u64, t as u64 * 33, frame(t as u64, energy, flux))
            .await;
        labels.push(outcome.telemetry.label);
        alerts += usize::from(outcome.alert.is_some());
    }

    assert!(labels.iter().all(|l| *l == VerdictLabel::Normal), "{labels:?}");
    assert_eq!(alerts, 0);
}

#[tokio::test]
async fn test_confident_sequence_panic_alerts() {
    let config = PipelineConfig {
        window_size: 5,
        sequence_stride: 5,
        ..PipelineConfig::default()
    };
    let (mut session, _) = session(&config, 0.95);

    let mut alerts = Vec::new();
    for t in 0..5u64 {
        let outcome = session.process_features(t, t * 33, frame(t, 1.0, 0.0)).await;
        alerts.extend(outcome.alert);
    }
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].frame_index, 4);
    assert_eq!(alerts[0].level, crowdwatch_models::RiskLevel::Red);

    let summary = session.finish().await;
    assert_eq!(summary.stats.panic_detections, 1);
    assert_eq!(summary.alerts.len(), 1);
    // no escalation: the rule path stays calm
    assert_eq!(summary.final_status.label, VerdictLabel::Normal);
}

/// Density strategy whose network fails on every frame.
struct BrokenDensity;

impl DensityEstimator for BrokenDensity {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn estimate(&self, _frame: &Frame) -> MediaResult<DensityEstimate> {
        Err(MediaError::inference_failed("non-finite density map"))
    }
}

#[tokio::test]
async fn test_failed_density_scores_frame_neutral_and_flags_it() {
    let config = PipelineConfig::default();
    let models = SessionModels::new(Arc::new(BrokenDensity), None);
    let mut session = StreamSession::new("broken", "synthetic", &config, &models);

    let image = RgbImage::from_pixel(32, 24, Rgb([40, 40, 40]));
    let mut records = Vec::new();
    for t in 0..3u64 {
        let frame = Frame::new(t, t * 33, image.clone());
        records.push(session.process_frame(&frame, &[]).await.telemetry);
    }

    for record in &records {
        assert_eq!(record.score, NEUTRAL_CONFIDENCE);
        assert!(record.is_degraded());
        assert!(record.error.as_deref().unwrap().contains("density estimation failed"));
        assert_eq!(record.label, VerdictLabel::Normal);
    }
    let json = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(json["score"], 0.5);
    assert!(json["error"].is_string());

    let summary = session.finish().await;
    assert_eq!(summary.stats.degraded_frames, 3);
    assert_eq!(summary.total_frames, 3);
}

#[tokio::test]
async fn test_healthy_frames_are_not_flagged() {
    let config = PipelineConfig::default();
    let models = SessionModels::new(Arc::new(GeometricDensity::default()), None);
    let mut session = StreamSession::new("healthy", "synthetic", &config, &models);

    let image = RgbImage::from_pixel(32, 24, Rgb([40, 40, 40]));
    for t in 0..2u64 {
        let outcome = session.process_frame(&Frame::new(t, t * 33, image.clone()), &[]).await;
        assert!(!outcome.telemetry.is_degraded());
    }
    assert_eq!(session.finish().await.stats.degraded_frames, 0);
}
