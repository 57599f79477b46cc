//! Shared data models for the crowdwatch pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Per-frame feature vectors
//! - Rule and sequence classification verdicts
//! - Reported status (label, color, score)
//! - Tracker detections read from sidecar files
//! - Wire schemas of the single-frame and windowed-inference invocation modes
//! - Telemetry records, alerts and end-of-stream summaries

pub mod alert;
pub mod detection;
pub mod feature;
pub mod status;
pub mod telemetry;
pub mod verdict;
pub mod wire;

pub use alert::{Alert, RiskLevel};
pub use detection::{BoundingBox, FrameDetections, TrackedDetection};
pub use feature::FeatureVector;
pub use status::{Status, StatusColor};
pub use telemetry::{DetectionStats, FrameTelemetry, StreamSummary};
pub use verdict::{
    ClassificationVerdict, LabelParseError, SequenceVerdict, VerdictLabel, VerdictSource,
};
pub use wire::{
    FrameFeatures, FrameFeaturesError, FramePanicError, FramePanicResponse, WindowRequest,
    WindowResponse, WindowResponseError,
};

/// Default number of feature vectors in one classifier window.
pub const DEFAULT_WINDOW_SIZE: usize = 30;

/// Number of channels per feature vector fed to the sequence model.
pub const FEATURE_CHANNELS: usize = 2;

/// Confidence reported whenever a verdict could not be computed.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;
