//! Telemetry sinks.
//!
//! Every sink receives one record per processed frame, every alert raised,
//! and the end-of-stream summary.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crowdwatch_models::{Alert, FrameTelemetry, StreamSummary};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::error::{PipelineError, PipelineResult};

/// One line of telemetry output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Frame(FrameTelemetry),
    Alert(Alert),
    Summary(StreamSummary),
}

#[async_trait]
pub trait TelemetrySink: Send {
    async fn record_frame(&mut self, record: &FrameTelemetry) -> PipelineResult<()>;

    async fn record_alert(&mut self, alert: &Alert) -> PipelineResult<()>;

    /// Write the summary and flush.
    async fn finish(&mut self, summary: &StreamSummary) -> PipelineResult<()>;
}

/// Writes one JSON object per line.
pub struct JsonLinesSink {
    writer: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    path: Option<PathBuf>,
}

impl JsonLinesSink {
    /// Create (or truncate) a telemetry file.
    pub async fn create(path: &Path) -> PipelineResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(path).await.map_err(|e| {
            PipelineError::telemetry(format!("cannot create {}: {}", path.display(), e))
        })?;
        Ok(Self {
            writer: BufWriter::new(Box::new(file)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn stdout() -> Self {
        Self {
            writer: BufWriter::new(Box::new(tokio::io::stdout())),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn write_event(&mut self, event: &TelemetryEvent) -> PipelineResult<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for JsonLinesSink {
    async fn record_frame(&mut self, record: &FrameTelemetry) -> PipelineResult<()> {
        self.write_event(&TelemetryEvent::Frame(record.clone())).await
    }

    async fn record_alert(&mut self, alert: &Alert) -> PipelineResult<()> {
        self.write_event(&TelemetryEvent::Alert(alert.clone())).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn finish(&mut self, summary: &StreamSummary) -> PipelineResult<()> {
        self.write_event(&TelemetryEvent::Summary(summary.clone())).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Keeps events in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn frames(&self) -> Vec<FrameTelemetry> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::Frame(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::Alert(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> Option<StreamSummary> {
        self.events().into_iter().rev().find_map(|e| match e {
            TelemetryEvent::Summary(s) => Some(s),
            _ => None,
        })
    }

    fn push(&self, event: TelemetryEvent) -> PipelineResult<()> {
        self.events
            .lock()
            .map_err(|_| PipelineError::telemetry("memory sink poisoned"))?
            .push(event);
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn record_frame(&mut self, record: &FrameTelemetry) -> PipelineResult<()> {
        self.push(TelemetryEvent::Frame(record.clone()))
    }

    async fn record_alert(&mut self, alert: &Alert) -> PipelineResult<()> {
        self.push(TelemetryEvent::Alert(alert.clone()))
    }

    async fn finish(&mut self, summary: &StreamSummary) -> PipelineResult<()> {
        self.push(TelemetryEvent::Summary(summary.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdwatch_models::{StatusColor, VerdictLabel};

    fn record(frame_index: u64) -> FrameTelemetry {
        FrameTelemetry {
            frame_index,
            timestamp_ms: frame_index * 33,
            live_count: 4,
            unique_count: 6,
            motion_energy: 1.25,
            flux_of_count: 0.0,
            status: "NORMAL".to_string(),
            color: StatusColor::Green,
            label: VerdictLabel::Normal,
            score: 0.36,
            sequence: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_json_lines_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cam.jsonl");

        let mut sink = JsonLinesSink::create(&path).await.unwrap();
        sink.record_frame(&record(0)).await.unwrap();
        sink.record_frame(&record(1)).await.unwrap();
        sink.writer.flush().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "frame");
        assert_eq!(lines[1]["frameIndex"], 1);
        assert_eq!(lines[1]["liveCount"], 4);
        assert_eq!(lines[1]["color"], "green");
    }

    #[tokio::test]
    async fn test_memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.record_frame(&record(7)).await.unwrap();
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.frames()[0].frame_index, 7);
        assert!(sink.summary().is_none());
    }
}
