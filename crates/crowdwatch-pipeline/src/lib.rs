//! Crowd panic early-warning pipeline.
//!
//! This crate provides:
//! - Environment-driven pipeline configuration
//! - Per-frame feature assembly and the rule classifier
//! - Sequence-model dispatch (inline or detached) and status arbitration
//!   with PANIC hysteresis
//! - Alerting, per-stream statistics and telemetry sinks
//! - The per-stream session and the runner that drives a source through it
//! - The single-frame invocation mode

pub mod alerts;
pub mod arbiter;
pub mod assembler;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod rules;
pub mod runner;
pub mod session;
pub mod single_frame;
pub mod telemetry;

pub use alerts::AlertPolicy;
pub use arbiter::{ArbiterDecision, StatusArbiter};
pub use assembler::{AssembledFrame, FeatureAssembler, FrameMeasurements};
pub use config::{CountSource, DispatchMode, PipelineConfig, RuleMode, SequenceBackendKind};
pub use dispatch::{CompletedVerdict, DispatchReport, SequenceDispatcher};
pub use error::{PipelineError, PipelineResult};
pub use logging::StreamLogger;
pub use rules::{RiskInput, RuleBasedClassifier};
pub use runner::run_stream;
pub use session::{FrameOutcome, SessionModels, StreamSession};
pub use single_frame::{frame_features, frame_panic, FrameMode};
pub use telemetry::{JsonLinesSink, MemorySink, TelemetryEvent, TelemetrySink};
