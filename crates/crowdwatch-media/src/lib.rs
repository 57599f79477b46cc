//! Frame sources and per-frame feature extractors.
//!
//! This crate provides:
//! - Ordered video sources (FFmpeg rawvideo pipe, image directories)
//! - Stream metadata via FFprobe
//! - Motion energy from OpenCV dense optical flow, with a single-frame edge proxy
//! - Geometric and learned (ONNX) density estimation
//! - Identity-set tracking over externally assigned track ids
//! - JSON-lines detection sidecar reading

mod cv;
pub mod density;
pub mod detections;
pub mod error;
pub mod frame;
pub mod identity;
pub mod motion;
pub mod probe;
pub mod source;

pub use density::{
    build_density_estimator, DensityEstimate, DensityEstimator, DensityStrategy,
    GeometricDensity, LearnedDensity,
};
pub use detections::DetectionSidecar;
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use identity::{IdentitySetTracker, IdentitySnapshot};
pub use motion::{
    edge_energy, FarnebackFlow, MotionConfig, MotionEnergyEstimator, MotionField, MotionSample,
};
pub use probe::{probe_video, VideoInfo};
pub use source::{open_source, FfmpegSource, ImageDirSource, VideoSource};
