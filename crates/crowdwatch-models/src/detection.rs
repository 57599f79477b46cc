//! Detector/tracker output consumed by the identity tracker.
//!
//! Detection and tracking run outside this code base. Their per-frame output
//! is read from a JSON-lines sidecar, one [`FrameDetections`] record per line.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Axis-aligned box `[x, y, width, height]` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox(pub f32, pub f32, pub f32, pub f32);

impl BoundingBox {
    pub fn x(&self) -> f32 {
        self.0
    }

    pub fn y(&self) -> f32 {
        self.1
    }

    pub fn width(&self) -> f32 {
        self.2
    }

    pub fn height(&self) -> f32 {
        self.3
    }

    pub fn area(&self) -> f32 {
        self.2.max(0.0) * self.3.max(0.0)
    }
}

/// One tracked object in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrackedDetection {
    /// Tracker-assigned id, stable across frames for the same object.
    /// Detections the tracker has not yet assigned an id are ignored.
    #[serde(default)]
    pub track_id: Option<u64>,
    pub class_label: String,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl TrackedDetection {
    pub fn new(track_id: u64, class_label: impl Into<String>) -> Self {
        Self {
            track_id: Some(track_id),
            class_label: class_label.into(),
            bbox: None,
            confidence: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Tracker output for a single frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameDetections {
    /// Frame index the detections belong to.
    pub frame: u64,
    #[serde(default)]
    pub detections: Vec<TrackedDetection>,
}

impl FrameDetections {
    /// A frame with zero detections.
    pub fn empty(frame: u64) -> Self {
        Self {
            frame,
            detections: Vec::new(),
        }
    }
}
