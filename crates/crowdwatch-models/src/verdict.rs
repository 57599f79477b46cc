//! Classification verdicts produced by the rule and sequence classifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::status::StatusColor;
use crate::NEUTRAL_CONFIDENCE;

/// Risk label attached to a verdict and to the reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLabel {
    /// Nothing unusual.
    #[default]
    Normal,
    /// Motion energy above the running threshold.
    WarningHighSpeed,
    /// Count flux above the rushing threshold.
    WarningSuddenInflux,
    /// Warning band of the density-weighted risk score.
    WarningHighActivity,
    /// Running and rushing at once, or risk above the panic band.
    Panic,
}

impl VerdictLabel {
    /// All labels, ordered by severity.
    pub const ALL: &'static [VerdictLabel] = &[
        VerdictLabel::Normal,
        VerdictLabel::WarningHighSpeed,
        VerdictLabel::WarningSuddenInflux,
        VerdictLabel::WarningHighActivity,
        VerdictLabel::Panic,
    ];

    /// Machine name of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::Normal => "NORMAL",
            VerdictLabel::WarningHighSpeed => "WARNING_HIGH_SPEED",
            VerdictLabel::WarningSuddenInflux => "WARNING_SUDDEN_INFLUX",
            VerdictLabel::WarningHighActivity => "WARNING_HIGH_ACTIVITY",
            VerdictLabel::Panic => "PANIC",
        }
    }

    /// Operator-facing status text.
    pub fn status_text(&self) -> &'static str {
        match self {
            VerdictLabel::Normal => "NORMAL",
            VerdictLabel::WarningHighSpeed => "WARNING: HIGH SPEED (RUNNING)",
            VerdictLabel::WarningSuddenInflux => "WARNING: SUDDEN INFLUX",
            VerdictLabel::WarningHighActivity => "WARNING: HIGH ACTIVITY",
            VerdictLabel::Panic => "!!! PANIC: STAMPEDE DETECTED !!!",
        }
    }

    /// Display color for the label.
    pub fn color(&self) -> StatusColor {
        match self {
            VerdictLabel::Normal => StatusColor::Green,
            VerdictLabel::WarningHighSpeed | VerdictLabel::WarningHighActivity => {
                StatusColor::Orange
            }
            VerdictLabel::WarningSuddenInflux => StatusColor::Yellow,
            VerdictLabel::Panic => StatusColor::Red,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, VerdictLabel::Panic)
    }
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VerdictLabel {
    type Err = LabelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NORMAL" => Ok(VerdictLabel::Normal),
            "WARNING_HIGH_SPEED" => Ok(VerdictLabel::WarningHighSpeed),
            "WARNING_SUDDEN_INFLUX" => Ok(VerdictLabel::WarningSuddenInflux),
            "WARNING_HIGH_ACTIVITY" => Ok(VerdictLabel::WarningHighActivity),
            "PANIC" => Ok(VerdictLabel::Panic),
            _ => Err(LabelParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown verdict label: {0}")]
pub struct LabelParseError(String);

/// Which classifier produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictSource {
    Rule,
    Sequence,
}

/// A single classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationVerdict {
    pub source: VerdictSource,
    pub score: f64,
    pub label: VerdictLabel,
}

impl ClassificationVerdict {
    pub fn rule(label: VerdictLabel, score: f64) -> Self {
        Self {
            source: VerdictSource::Rule,
            score,
            label,
        }
    }
}

/// Outcome of one sequence-model invocation over a completed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SequenceVerdict {
    /// Sequence number of the window this verdict belongs to (1-based).
    pub window_seq: u64,
    /// Tick of the newest vector in the window.
    pub end_timestamp: u64,
    pub panic_detected: bool,
    /// Model probability in [0, 1], or the neutral 0.5 on failure.
    pub confidence: f64,
    pub threshold: f64,
    /// Set when the verdict is a safe default produced after a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SequenceVerdict {
    /// Build a verdict from a model probability.
    pub fn from_probability(window_seq: u64, end_timestamp: u64, p: f64, threshold: f64) -> Self {
        Self {
            window_seq,
            end_timestamp,
            panic_detected: p > threshold,
            confidence: p,
            threshold,
            error: None,
        }
    }

    /// Neutral verdict reported when inference could not complete.
    pub fn safe_default(
        window_seq: u64,
        end_timestamp: u64,
        threshold: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            window_seq,
            end_timestamp,
            panic_detected: false,
            confidence: NEUTRAL_CONFIDENCE,
            threshold,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// View this verdict as a classification verdict.
    pub fn as_classification(&self) -> ClassificationVerdict {
        ClassificationVerdict {
            source: VerdictSource::Sequence,
            score: self.confidence,
            label: if self.panic_detected {
                VerdictLabel::Panic
            } else {
                VerdictLabel::Normal
            },
        }
    }
}
