//! Prometheus metrics for the pipeline.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{PipelineError, PipelineResult};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> PipelineResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| PipelineError::Metrics(e.to_string()))
}

/// Metric names as constants for consistency.
pub mod names {
    // Frame metrics
    pub const FRAMES_PROCESSED_TOTAL: &str = "crowdwatch_frames_processed_total";
    pub const DECODE_FAILURES_TOTAL: &str = "crowdwatch_decode_failures_total";
    pub const DEGRADED_FRAMES_TOTAL: &str = "crowdwatch_degraded_frames_total";
    pub const FRAME_DURATION_SECONDS: &str = "crowdwatch_frame_duration_seconds";
    pub const LIVE_COUNT: &str = "crowdwatch_live_count";

    // Sequence model metrics
    pub const SEQUENCE_INVOCATIONS_TOTAL: &str = "crowdwatch_sequence_invocations_total";
    pub const SEQUENCE_FAILURES_TOTAL: &str = "crowdwatch_sequence_failures_total";
    pub const SEQUENCE_TIMEOUTS_TOTAL: &str = "crowdwatch_sequence_timeouts_total";
    pub const SEQUENCE_STALE_TOTAL: &str = "crowdwatch_sequence_stale_total";
    pub const SEQUENCE_SKIPPED_TOTAL: &str = "crowdwatch_sequence_skipped_total";

    // Status metrics
    pub const STATUS_TRANSITIONS_TOTAL: &str = "crowdwatch_status_transitions_total";
    pub const ALERTS_TOTAL: &str = "crowdwatch_alerts_total";
    pub const STREAMS_ACTIVE: &str = "crowdwatch_streams_active";
}

/// Record one processed frame.
pub fn record_frame(stream_id: &str, live_count: usize, duration_secs: f64) {
    let labels = [("stream", stream_id.to_string())];
    counter!(names::FRAMES_PROCESSED_TOTAL, &labels).increment(1);
    histogram!(names::FRAME_DURATION_SECONDS, &labels).record(duration_secs);
    gauge!(names::LIVE_COUNT, &labels).set(live_count as f64);
}

pub fn record_decode_failure(stream_id: &str) {
    let labels = [("stream", stream_id.to_string())];
    counter!(names::DECODE_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_degraded_frame(stream_id: &str) {
    let labels = [("stream", stream_id.to_string())];
    counter!(names::DEGRADED_FRAMES_TOTAL, &labels).increment(1);
}

/// Record one completed sequence call.
pub fn record_sequence(backend: &str, failed: bool, timed_out: bool) {
    let labels = [("backend", backend.to_string())];
    counter!(names::SEQUENCE_INVOCATIONS_TOTAL, &labels).increment(1);
    if failed {
        counter!(names::SEQUENCE_FAILURES_TOTAL, &labels).increment(1);
    }
    if timed_out {
        counter!(names::SEQUENCE_TIMEOUTS_TOTAL, &labels).increment(1);
    }
}

pub fn record_sequence_stale(count: u64) {
    counter!(names::SEQUENCE_STALE_TOTAL).increment(count);
}

pub fn record_sequence_skipped() {
    counter!(names::SEQUENCE_SKIPPED_TOTAL).increment(1);
}

pub fn record_status_transition(from: &str, to: &str) {
    let labels = [("from", from.to_string()), ("to", to.to_string())];
    counter!(names::STATUS_TRANSITIONS_TOTAL, &labels).increment(1);
}

pub fn record_alert(level: &str) {
    let labels = [("level", level.to_string())];
    counter!(names::ALERTS_TOTAL, &labels).increment(1);
}

/// Update active streams gauge.
pub fn set_active_streams(count: usize) {
    gauge!(names::STREAMS_ACTIVE).set(count as f64);
}
