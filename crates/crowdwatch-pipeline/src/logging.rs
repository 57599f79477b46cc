//! Structured stream logging utilities.
//!
//! Provides consistent, structured logging for one stream's lifecycle with
//! tracing spans and contextual information.

use crowdwatch_models::{Alert, SequenceVerdict, Status, StreamSummary};
use tracing::{debug, error, info, warn, Span};

/// Stream logger for structured logging with consistent formatting.
///
/// Every event carries the stream id and the source description.
#[derive(Debug, Clone)]
pub struct StreamLogger {
    stream_id: String,
    source: String,
}

impl StreamLogger {
    /// Create a new logger for a stream.
    ///
    /// # Arguments
    /// * `stream_id` - Unique identifier of the stream
    /// * `source` - Human-readable source description (path, device)
    pub fn new(stream_id: &str, source: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            source: source.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            stream_id = %self.stream_id,
            source = %self.source,
            "Stream started: {}", message
        );
    }

    pub fn log_window_dispatched(&self, window_seq: u64, end_timestamp: u64) {
        debug!(
            stream_id = %self.stream_id,
            window_seq,
            end_timestamp,
            "Sequence window dispatched"
        );
    }

    pub fn log_window_skipped(&self, in_flight: usize) {
        warn!(
            stream_id = %self.stream_id,
            in_flight,
            "Sequence window skipped: in-flight limit reached"
        );
    }

    pub fn log_verdict(&self, verdict: &SequenceVerdict) {
        match &verdict.error {
            Some(reason) => warn!(
                stream_id = %self.stream_id,
                window_seq = verdict.window_seq,
                error = %reason,
                "Sequence verdict degraded to safe default"
            ),
            None => info!(
                stream_id = %self.stream_id,
                window_seq = verdict.window_seq,
                panic_detected = verdict.panic_detected,
                confidence = verdict.confidence,
                "Sequence verdict applied"
            ),
        }
    }

    pub fn log_status_change(&self, frame_index: u64, previous: &Status, current: &Status) {
        info!(
            stream_id = %self.stream_id,
            frame_index,
            from = %previous.label,
            to = %current.label,
            score = current.score,
            "Status changed: {}", current.text()
        );
    }

    pub fn log_alert(&self, alert: &Alert) {
        warn!(
            stream_id = %self.stream_id,
            alert_id = %alert.id,
            frame_index = alert.frame_index,
            level = ?alert.level,
            confidence = alert.confidence,
            "{}", alert.message
        );
    }

    /// Log a recoverable problem.
    pub fn log_warning(&self, message: &str) {
        warn!(
            stream_id = %self.stream_id,
            source = %self.source,
            "Stream warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            stream_id = %self.stream_id,
            source = %self.source,
            "Stream error: {}", message
        );
    }

    pub fn log_completion(&self, summary: &StreamSummary) {
        info!(
            stream_id = %self.stream_id,
            source = %self.source,
            total_frames = summary.total_frames,
            final_status = %summary.final_status.label,
            alerts = summary.alerts.len(),
            sequence_invocations = summary.stats.sequence_invocations,
            "Stream completed"
        );
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Create a tracing span for this stream.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "stream",
            stream_id = %self.stream_id,
            source = %self.source
        )
    }
}
