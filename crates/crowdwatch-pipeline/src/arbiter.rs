//! Status arbitration with PANIC hysteresis.

use crowdwatch_models::{ClassificationVerdict, SequenceVerdict, Status, VerdictLabel};

/// Status reported for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbiterDecision {
    pub status: Status,
    /// Whether the reported label differs from the previous tick.
    pub changed: bool,
}

/// Fuses the per-frame rule verdict with the intermittent sequence verdict.
///
/// The rule label drives status text and color. Entering PANIC requires
/// `hysteresis_frames` consecutive panic-satisfying frames and leaving it
/// requires as many consecutive non-panic frames. While entry is pending the
/// previously reported label is held. Other labels switch immediately.
#[derive(Debug, Clone)]
pub struct StatusArbiter {
    hysteresis_frames: usize,
    escalate_on_sequence_panic: bool,
    current: Status,
    panic_streak: usize,
    calm_streak: usize,
}

impl StatusArbiter {
    pub fn new(hysteresis_frames: usize, escalate_on_sequence_panic: bool) -> Self {
        Self {
            hysteresis_frames: hysteresis_frames.max(1),
            escalate_on_sequence_panic,
            current: Status::default(),
            panic_streak: 0,
            calm_streak: 0,
        }
    }

    pub fn current(&self) -> Status {
        self.current
    }

    /// Decide the status for this tick.
    ///
    /// The headline score is the sequence confidence when a verdict was
    /// applied on this tick, the rule score otherwise.
    pub fn decide(
        &mut self,
        rule: &ClassificationVerdict,
        sequence: Option<&SequenceVerdict>,
    ) -> ArbiterDecision {
        let sequence_panic = sequence
            .filter(|v| !v.is_error())
            .map(|v| v.as_classification().label.is_panic())
            .unwrap_or(false);
        let candidate =
            rule.label.is_panic() || (self.escalate_on_sequence_panic && sequence_panic);

        if candidate {
            self.panic_streak += 1;
            self.calm_streak = 0;
        } else {
            self.calm_streak += 1;
            self.panic_streak = 0;
        }

        let previous = self.current.label;
        let label = if previous.is_panic() {
            if self.calm_streak >= self.hysteresis_frames {
                non_panic(rule.label)
            } else {
                VerdictLabel::Panic
            }
        } else if candidate {
            if self.panic_streak >= self.hysteresis_frames {
                VerdictLabel::Panic
            } else {
                previous
            }
        } else {
            rule.label
        };

        let score = sequence.map(|v| v.confidence).unwrap_or(rule.score);
        self.current = Status::new(label, score);

        ArbiterDecision {
            status: self.current,
            changed: label != previous,
        }
    }

    pub fn reset(&mut self) {
        self.current = Status::default();
        self.panic_streak = 0;
        self.calm_streak = 0;
    }
}

// A calm streak can only end on a non-candidate frame, whose rule label is
// never PANIC.
fn non_panic(label: VerdictLabel) -> VerdictLabel {
    if label.is_panic() {
        VerdictLabel::Normal
    } else {
        label
    }
}
