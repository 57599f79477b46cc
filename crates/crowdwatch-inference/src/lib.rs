//! Temporal panic classification over sliding feature windows.
//!
//! This crate provides:
//! - The fixed-capacity sliding window buffer fed once per frame
//! - Per-window (or global) z-score normalization
//! - The ONNX sequence model and the backends that reach it, in process or
//!   through the `crowdwatch-infer` worker
//! - The classifier adapter that turns any failure into a safe default verdict

pub mod backend;
pub mod classifier;
pub mod error;
pub mod model;
pub mod normalize;
pub mod window;
pub mod worker;

pub use backend::{LocalBackend, ProcessBackend, SequenceBackend, UnavailableBackend};
pub use classifier::{ClassifierConfig, ClassifierCounters, SequenceClassifier};
pub use error::{InferenceError, InferenceResult};
pub use model::{OnnxSequenceModel, SequenceModel, DEFAULT_SEQUENCE_MODEL};
pub use normalize::{NormalizationRegime, NormalizedWindow, Normalizer, NORMALIZATION_EPSILON};
pub use window::{SlidingWindow, SlidingWindowBuffer};
