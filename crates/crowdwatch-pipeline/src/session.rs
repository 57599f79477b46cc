//! Per-stream processing session.
//!
//! A [`StreamSession`] exclusively owns all per-stream state (motion
//! reference, identity sets, feature window, arbiter, alert cooldown) and
//! processes frames strictly in arrival order. Models are shared read-only
//! between sessions through [`SessionModels`].

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use crowdwatch_inference::{
    ClassifierConfig, LocalBackend, Normalizer, OnnxSequenceModel, ProcessBackend,
    SequenceBackend, SequenceClassifier, SlidingWindowBuffer, UnavailableBackend,
};
use crowdwatch_media::{
    build_density_estimator, DensityEstimate, DensityEstimator, Frame, IdentitySetTracker,
    MotionEnergyEstimator, MotionSample,
};
use crowdwatch_models::{
    Alert, DetectionStats, FrameTelemetry, SequenceVerdict, StreamSummary, TrackedDetection,
    NEUTRAL_CONFIDENCE,
};
use tracing::{info, warn};

use crate::alerts::AlertPolicy;
use crate::arbiter::StatusArbiter;
use crate::assembler::{AssembledFrame, FeatureAssembler, FrameMeasurements};
use crate::config::{PipelineConfig, SequenceBackendKind};
use crate::dispatch::{DispatchReport, SequenceDispatcher};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::StreamLogger;
use crate::metrics;
use crate::rules::RuleBasedClassifier;

/// Models shared by every session of a process.
#[derive(Clone)]
pub struct SessionModels {
    pub density: Arc<dyn DensityEstimator>,
    /// `None` when the sequence path is disabled.
    pub classifier: Option<Arc<SequenceClassifier>>,
}

impl SessionModels {
    pub fn new(
        density: Arc<dyn DensityEstimator>,
        classifier: Option<Arc<SequenceClassifier>>,
    ) -> Self {
        Self {
            density,
            classifier,
        }
    }

    /// Load every model once, before any stream starts.
    ///
    /// Missing weights degrade to the geometric density strategy and to a
    /// sequence classifier that always answers the safe default, unless
    /// `require_models` is set.
    pub fn load(config: &PipelineConfig) -> PipelineResult<Self> {
        let density = build_density_estimator(&config.density, config.require_models)?;

        let classifier_config = ClassifierConfig {
            window_size: config.window_size,
            decision_threshold: config.decision_threshold,
            timeout: config.sequence_timeout,
        };

        let backend: Arc<dyn SequenceBackend> = match config.sequence_backend {
            SequenceBackendKind::None => {
                info!("Sequence classifier disabled");
                return Ok(Self::new(density, None));
            }
            SequenceBackendKind::Onnx => {
                match OnnxSequenceModel::load(&config.sequence_model, config.window_size) {
                    Ok(model) => {
                        info!(
                            model = %config.sequence_model.display(),
                            normalization = %config.normalization,
                            "Sequence model ready"
                        );
                        Arc::new(LocalBackend::new(
                            Arc::new(model),
                            Normalizer::new(config.normalization),
                        ))
                    }
                    Err(e) if config.require_models => {
                        return Err(PipelineError::model_unavailable(e.to_string()));
                    }
                    Err(e) => {
                        warn!(
                            model = %config.sequence_model.display(),
                            error = %e,
                            "SEQUENCE MODEL UNAVAILABLE, every window will report the safe default"
                        );
                        Arc::new(UnavailableBackend::new(e.to_string()))
                    }
                }
            }
            SequenceBackendKind::Process => {
                let backend = ProcessBackend::from_command_line(&config.infer_command)?;
                info!(
                    program = backend.program(),
                    normalization = %config.normalization,
                    "Sequence worker configured"
                );
                Arc::new(backend)
            }
        };

        Ok(Self::new(
            density,
            Some(Arc::new(SequenceClassifier::new(backend, classifier_config))),
        ))
    }
}

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub telemetry: FrameTelemetry,
    pub alert: Option<Alert>,
}

pub struct StreamSession {
    stream_id: String,
    source: String,
    logger: StreamLogger,
    window_size: usize,
    sequence_stride: usize,
    motion: MotionEnergyEstimator,
    density: Arc<dyn DensityEstimator>,
    identity: IdentitySetTracker,
    assembler: FeatureAssembler,
    rules: RuleBasedClassifier,
    window: SlidingWindowBuffer,
    dispatcher: Option<SequenceDispatcher>,
    backend_name: &'static str,
    arbiter: StatusArbiter,
    alert_policy: AlertPolicy,
    stats: DetectionStats,
    alerts: Vec<Alert>,
    frames_in_window: u64,
    started_at: DateTime<Utc>,
}

impl StreamSession {
    pub fn new(
        stream_id: impl Into<String>,
        source: impl Into<String>,
        config: &PipelineConfig,
        models: &SessionModels,
    ) -> Self {
        let stream_id = stream_id.into();
        let source = source.into();
        let logger = StreamLogger::new(&stream_id, &source);

        let backend_name = models
            .classifier
            .as_ref()
            .map(|c| c.backend_name())
            .unwrap_or("none");
        let dispatcher = models.classifier.as_ref().map(|classifier| {
            SequenceDispatcher::new(config.dispatch, classifier.clone(), config.max_in_flight)
        });

        logger.log_start(&format!(
            "density={} sequence={} dispatch={} rule_mode={} window={} stride={} hysteresis={}",
            models.density.name(),
            backend_name,
            config.dispatch,
            config.rule_mode,
            config.window_size,
            config.sequence_stride,
            config.hysteresis_frames,
        ));

        Self {
            alert_policy: AlertPolicy::new(
                stream_id.clone(),
                config.alert_min_confidence,
                config.alert_cooldown,
            ),
            stream_id,
            source,
            logger,
            window_size: config.window_size,
            sequence_stride: config.sequence_stride.max(1),
            motion: MotionEnergyEstimator::new(config.motion.clone()),
            density: models.density.clone(),
            identity: IdentitySetTracker::new(config.counted_classes.iter()),
            assembler: FeatureAssembler::new(config.count_source),
            rules: RuleBasedClassifier::from_config(config),
            window: SlidingWindowBuffer::new(config.window_size),
            dispatcher,
            backend_name,
            arbiter: StatusArbiter::new(config.hysteresis_frames, config.escalate_on_sequence_panic),
            stats: DetectionStats::default(),
            alerts: Vec::new(),
            frames_in_window: 0,
            started_at: Utc::now(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn logger(&self) -> &StreamLogger {
        &self.logger
    }

    pub fn stats(&self) -> &DetectionStats {
        &self.stats
    }

    /// Process one decoded frame with its tracker detections.
    ///
    /// Motion and density failures are absorbed: the frame is scored with
    /// zero motion or zero density, reported with neutral confidence and
    /// flagged with the failure in its telemetry.
    pub async fn process_frame(
        &mut self,
        frame: &Frame,
        detections: &[TrackedDetection],
    ) -> FrameOutcome {
        let started = Instant::now();
        let mut failures = Vec::new();

        let motion = self.motion.estimate(frame).unwrap_or_else(|e| {
            failures.push(format!("motion estimation failed: {e}"));
            MotionSample::warm_up()
        });
        let density = self.density.estimate(frame).unwrap_or_else(|e| {
            failures.push(format!("density estimation failed: {e}"));
            DensityEstimate::default()
        });
        let identity = self.identity.update(detections);

        let error = (!failures.is_empty()).then(|| failures.join("; "));
        if let Some(error) = &error {
            self.stats.degraded_frames += 1;
            self.logger
                .log_warning(&format!("frame {} degraded: {}", frame.index, error));
            metrics::record_degraded_frame(&self.stream_id);
        }

        let assembled = self.assembler.assemble(
            frame.index,
            &FrameMeasurements {
                motion,
                density,
                identity,
            },
        );
        let outcome = self
            .score_frame(frame.index, frame.timestamp_ms, assembled, error)
            .await;

        metrics::record_frame(
            &self.stream_id,
            outcome.telemetry.live_count,
            started.elapsed().as_secs_f64(),
        );
        outcome
    }

    /// Classify an already assembled frame and arbitrate its status.
    pub async fn process_features(
        &mut self,
        frame_index: u64,
        timestamp_ms: u64,
        assembled: AssembledFrame,
    ) -> FrameOutcome {
        self.score_frame(frame_index, timestamp_ms, assembled, None)
            .await
    }

    async fn score_frame(
        &mut self,
        frame_index: u64,
        timestamp_ms: u64,
        assembled: AssembledFrame,
        error: Option<String>,
    ) -> FrameOutcome {
        let features = assembled.features;
        let rule = self.rules.classify(&features, Some(&assembled.risk));

        self.window.push(features);
        self.frames_in_window += 1;
        let due = self.window.is_full()
            && (self.frames_in_window - self.window_size as u64) % self.sequence_stride as u64 == 0;

        let window = due.then(|| self.window.snapshot());
        let report = match self.dispatcher.as_mut() {
            Some(dispatcher) => dispatcher.tick(window).await,
            None => DispatchReport::default(),
        };
        let applied = self.absorb_report(&report, features.timestamp);

        let previous = self.arbiter.current();
        let decision = self.arbiter.decide(&rule, applied.as_ref());
        let status = decision.status;
        self.stats.record_status(status.label, decision.changed);
        if decision.changed {
            self.logger.log_status_change(frame_index, &previous, &status);
            metrics::record_status_transition(previous.label.as_str(), status.label.as_str());
        }

        let entered_panic = decision.changed && status.label.is_panic();
        let alert = self.alert_policy.evaluate(
            frame_index,
            timestamp_ms,
            &status,
            entered_panic,
            applied.as_ref(),
            features.live_count,
        );
        if let Some(alert) = &alert {
            self.stats.alerts_raised += 1;
            self.alerts.push(alert.clone());
            self.logger.log_alert(alert);
            metrics::record_alert(alert.level.as_str());
        }

        FrameOutcome {
            telemetry: FrameTelemetry {
                frame_index,
                timestamp_ms,
                live_count: features.live_count,
                unique_count: assembled.unique_count,
                motion_energy: features.motion_energy,
                flux_of_count: features.flux_of_count,
                status: status.text().to_string(),
                color: status.color,
                label: status.label,
                score: if error.is_some() {
                    NEUTRAL_CONFIDENCE
                } else {
                    status.score
                },
                sequence: applied,
                error,
            },
            alert,
        }
    }

    fn absorb_report(&mut self, report: &DispatchReport, end_timestamp: u64) -> Option<SequenceVerdict> {
        if let Some(seq) = report.dispatched {
            self.logger.log_window_dispatched(seq, end_timestamp);
        }
        if report.skipped {
            self.stats.skipped_windows += 1;
            self.logger.log_window_skipped(
                self.dispatcher.as_ref().map(|d| d.in_flight()).unwrap_or(0),
            );
            metrics::record_sequence_skipped();
        }
        for done in &report.completed {
            self.stats.record_sequence(&done.verdict);
            if done.timed_out {
                self.stats.sequence_timeouts += 1;
            }
            metrics::record_sequence(self.backend_name, done.verdict.is_error(), done.timed_out);
        }
        if report.stale > 0 {
            self.stats.stale_results += report.stale;
            metrics::record_sequence_stale(report.stale);
        }
        if let Some(verdict) = &report.applied {
            self.logger.log_verdict(verdict);
        }
        report.applied.clone()
    }

    /// Count a frame that could not be decoded.
    pub fn record_decode_failure(&mut self) {
        self.stats.decode_failures += 1;
        metrics::record_decode_failure(&self.stream_id);
    }

    /// Restart the stream: clear window, identity sets, motion reference,
    /// flux history, arbiter state and alert cooldown.
    ///
    /// Statistics and raised alerts are kept for the summary.
    pub fn reset(&mut self) {
        self.window.clear();
        self.frames_in_window = 0;
        self.identity.reset();
        self.motion.reset();
        self.assembler.reset();
        self.arbiter.reset();
        self.alert_policy.reset();
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            dispatcher.reset();
        }
        self.logger.log_warning("session reset, buffers cleared");
    }

    /// Wait for pending sequence calls and build the end-of-stream summary.
    pub async fn finish(&mut self) -> StreamSummary {
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            let report = dispatcher.finish().await;
            self.absorb_report(&report, 0);
        }

        let summary = StreamSummary {
            stream_id: self.stream_id.clone(),
            source: self.source.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            total_frames: self.stats.total_frames,
            unique_instances: self.identity.unique_instances(),
            final_status: self.arbiter.current(),
            avg_confidence: self.stats.avg_confidence(),
            stats: self.stats.clone(),
            alerts: self.alerts.clone(),
        };
        self.logger.log_completion(&summary);
        summary
    }
}
