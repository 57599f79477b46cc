//! Telemetry records emitted per frame and at end of stream.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::alert::Alert;
use crate::status::{Status, StatusColor};
use crate::verdict::{SequenceVerdict, VerdictLabel};

/// Per-frame telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrameTelemetry {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub live_count: usize,
    pub unique_count: usize,
    pub motion_energy: f64,
    pub flux_of_count: f64,
    /// Operator-facing status text.
    pub status: String,
    pub color: StatusColor,
    pub label: VerdictLabel,
    pub score: f64,
    /// Sequence verdict applied on this tick, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceVerdict>,
    /// Set when feature extraction failed on this frame; `score` is then
    /// the neutral 0.5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrameTelemetry {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    pub fn status(&self) -> Status {
        Status {
            label: self.label,
            color: self.color,
            score: self.score,
        }
    }
}

/// Aggregate detection statistics of one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionStats {
    pub total_frames: u64,
    pub decode_failures: u64,
    /// Frames scored with neutral confidence after a feature extraction failure.
    #[serde(default)]
    pub degraded_frames: u64,
    pub sequence_invocations: u64,
    pub panic_detections: u64,
    pub sequence_failures: u64,
    pub sequence_timeouts: u64,
    pub stale_results: u64,
    pub skipped_windows: u64,
    pub max_confidence: f64,
    confidence_sum: f64,
    confidence_samples: u64,
    /// Frames spent in each reported label.
    pub status_frames: BTreeMap<String, u64>,
    pub status_transitions: u64,
    pub alerts_raised: u64,
}

impl DetectionStats {
    /// Record one applied sequence verdict.
    pub fn record_sequence(&mut self, verdict: &SequenceVerdict) {
        self.sequence_invocations += 1;
        if verdict.is_error() {
            self.sequence_failures += 1;
            return;
        }
        if verdict.panic_detected {
            self.panic_detections += 1;
        }
        self.confidence_sum += verdict.confidence;
        self.confidence_samples += 1;
        if verdict.confidence > self.max_confidence {
            self.max_confidence = verdict.confidence;
        }
    }

    /// Record the status reported for one frame.
    pub fn record_status(&mut self, label: VerdictLabel, changed: bool) {
        self.total_frames += 1;
        *self.status_frames.entry(label.as_str().to_string()).or_insert(0) += 1;
        if changed {
            self.status_transitions += 1;
        }
    }

    /// Mean confidence over successful sequence verdicts.
    pub fn avg_confidence(&self) -> f64 {
        if self.confidence_samples > 0 {
            self.confidence_sum / self.confidence_samples as f64
        } else {
            0.0
        }
    }
}

/// End-of-stream summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StreamSummary {
    pub stream_id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_frames: u64,
    /// Unique tracked ids seen per class label.
    pub unique_instances: BTreeMap<String, usize>,
    pub final_status: Status,
    pub avg_confidence: f64,
    pub stats: DetectionStats,
    pub alerts: Vec<Alert>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_ignore_failed_verdict_confidence() {
        let mut stats = DetectionStats::default();
        stats.record_sequence(&SequenceVerdict::from_probability(1, 29, 0.8, 0.5));
        stats.record_sequence(&SequenceVerdict::safe_default(2, 59, 0.5, "timeout"));
        stats.record_sequence(&SequenceVerdict::from_probability(3, 89, 0.2, 0.5));

        assert_eq!(stats.sequence_invocations, 3);
        assert_eq!(stats.sequence_failures, 1);
        assert_eq!(stats.panic_detections, 1);
        assert_eq!(stats.max_confidence, 0.8);
        assert!((stats.avg_confidence() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_status_frames_by_label() {
        let mut stats = DetectionStats::default();
        stats.record_status(VerdictLabel::Normal, false);
        stats.record_status(VerdictLabel::Normal, false);
        stats.record_status(VerdictLabel::Panic, true);
        assert_eq!(stats.total_frames, 3);
        assert_eq!(stats.status_frames["NORMAL"], 2);
        assert_eq!(stats.status_frames["PANIC"], 1);
        assert_eq!(stats.status_transitions, 1);
    }

    #[test]
    fn test_telemetry_keys() {
        let record = FrameTelemetry {
            frame_index: 0,
            timestamp_ms: 0,
            live_count: 3,
            unique_count: 5,
            motion_energy: 0.0,
            flux_of_count: 0.0,
            status: "NORMAL".to_string(),
            color: StatusColor::Green,
            label: VerdictLabel::Normal,
            score: 0.0,
            sequence: None,
            error: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        for key in ["liveCount", "uniqueCount", "motionEnergy", "status", "color"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("sequence").is_none());
        assert!(json.get("error").is_none());
        assert!(!record.is_degraded());

        let degraded = FrameTelemetry {
            score: 0.5,
            error: Some("density estimation failed".to_string()),
            ..record
        };
        let json = serde_json::to_value(&degraded).unwrap();
        assert_eq!(json["error"], "density estimation failed");
        assert_eq!(json["score"], 0.5);
        assert_eq!(json["color"], "green");
    }
}
