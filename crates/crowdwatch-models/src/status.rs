//! Reported pipeline status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::verdict::VerdictLabel;

/// Display color of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Yellow,
    Orange,
    Red,
}

impl StatusColor {
    /// RGB triple used by overlays.
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            StatusColor::Green => (0, 255, 0),
            StatusColor::Yellow => (255, 255, 0),
            StatusColor::Orange => (255, 165, 0),
            StatusColor::Red => (255, 0, 0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusColor::Green => "green",
            StatusColor::Yellow => "yellow",
            StatusColor::Orange => "orange",
            StatusColor::Red => "red",
        }
    }
}

impl fmt::Display for StatusColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Last reported status of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Status {
    pub label: VerdictLabel,
    pub color: StatusColor,
    /// Headline number: sequence confidence when available this tick,
    /// rule score otherwise.
    pub score: f64,
}

impl Status {
    pub fn new(label: VerdictLabel, score: f64) -> Self {
        Self {
            label,
            color: label.color(),
            score,
        }
    }

    pub fn text(&self) -> &'static str {
        self.label.status_text()
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new(VerdictLabel::Normal, 0.0)
    }
}
