//! Operator alert policy.

use std::time::Duration;

use crowdwatch_models::{Alert, RiskLevel, SequenceVerdict, Status, VerdictLabel};

/// Sequence confidence above which an alert is RED rather than YELLOW.
pub const RED_CONFIDENCE: f64 = 0.9;

/// Confidence of a PANIC entered without a successful sequence verdict.
pub const RULE_PANIC_CONFIDENCE: f64 = 1.0;

/// Decides when a stream raises an alert.
///
/// An alert fires when the reported status enters PANIC, or when a
/// successful sequence verdict reports panic with confidence above
/// `min_confidence`. At most one alert is raised per cooldown, measured in
/// stream time.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    stream_id: String,
    min_confidence: f64,
    cooldown_ms: u64,
    last_alert_ms: Option<u64>,
}

impl AlertPolicy {
    pub fn new(stream_id: impl Into<String>, min_confidence: f64, cooldown: Duration) -> Self {
        Self {
            stream_id: stream_id.into(),
            min_confidence,
            cooldown_ms: cooldown.as_millis() as u64,
            last_alert_ms: None,
        }
    }

    /// Evaluate one tick.
    ///
    /// A PANIC entry reports the confidence of the successful sequence
    /// verdict applied on the same tick, or [`RULE_PANIC_CONFIDENCE`].
    pub fn evaluate(
        &mut self,
        frame_index: u64,
        timestamp_ms: u64,
        status: &Status,
        entered_panic: bool,
        sequence: Option<&SequenceVerdict>,
        live_count: usize,
    ) -> Option<Alert> {
        let sequence = sequence.filter(|v| !v.is_error());
        let candidate = if entered_panic && status.label.is_panic() {
            let confidence = sequence
                .map(|v| v.confidence)
                .unwrap_or(RULE_PANIC_CONFIDENCE);
            Some((RiskLevel::Red, confidence))
        } else {
            sequence
                .filter(|v| v.panic_detected && v.confidence > self.min_confidence)
                .map(|v| {
                    let level = if v.confidence > RED_CONFIDENCE {
                        RiskLevel::Red
                    } else {
                        RiskLevel::Yellow
                    };
                    (level, v.confidence)
                })
        };
        let (level, confidence) = candidate?;

        if let Some(last) = self.last_alert_ms {
            if timestamp_ms.saturating_sub(last) < self.cooldown_ms {
                return None;
            }
        }
        self.last_alert_ms = Some(timestamp_ms);

        Some(Alert::new(
            self.stream_id.clone(),
            frame_index,
            level,
            VerdictLabel::Panic,
            confidence,
            live_count,
        ))
    }

    pub fn reset(&mut self) {
        self.last_alert_ms = None;
    }
}
