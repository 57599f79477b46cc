//! Operator alerts raised on panic conditions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::verdict::VerdictLabel;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Yellow,
    Red,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Yellow => "YELLOW",
            RiskLevel::Red => "RED",
        }
    }
}

/// An alert raised for a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Alert {
    pub id: Uuid,
    pub stream_id: String,
    pub frame_index: u64,
    pub created_at: DateTime<Utc>,
    pub level: RiskLevel,
    pub label: VerdictLabel,
    /// In [0, 1]. The confidence of the sequence verdict behind the alert,
    /// or 1.0 for a PANIC entered on the rule path alone.
    pub confidence: f64,
    pub live_count: usize,
    pub message: String,
}

impl Alert {
    pub fn new(
        stream_id: impl Into<String>,
        frame_index: u64,
        level: RiskLevel,
        label: VerdictLabel,
        confidence: f64,
        live_count: usize,
    ) -> Self {
        let stream_id = stream_id.into();
        let message = format!(
            "Panic detected on stream {} with {}% confidence",
            stream_id,
            (confidence * 100.0).round()
        );
        Self {
            id: Uuid::new_v4(),
            stream_id,
            frame_index,
            created_at: Utc::now(),
            level,
            label,
            confidence,
            live_count,
            message,
        }
    }
}
