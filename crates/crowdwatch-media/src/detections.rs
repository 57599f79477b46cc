//! JSON-lines detection sidecar.
//!
//! One [`FrameDetections`] record per line, in ascending frame order. Frames
//! without a record have zero detections.

use std::path::{Path, PathBuf};

use crowdwatch_models::{FrameDetections, TrackedDetection};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

use crate::error::{MediaError, MediaResult};

/// Sequential reader matching sidecar records to frame indices.
pub struct DetectionSidecar {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    pending: Option<FrameDetections>,
    exhausted: bool,
    malformed: u64,
}

impl DetectionSidecar {
    pub async fn open(path: &Path) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            pending: None,
            exhausted: false,
            malformed: 0,
        })
    }

    /// Number of lines skipped because they did not parse.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed
    }

    /// Detections of `frame`. Records for earlier frames are discarded.
    pub async fn detections_for(&mut self, frame: u64) -> MediaResult<Vec<TrackedDetection>> {
        loop {
            if let Some(record) = self.pending.take() {
                if record.frame == frame {
                    return Ok(record.detections);
                }
                if record.frame > frame {
                    self.pending = Some(record);
                    return Ok(Vec::new());
                }
            }
            match self.next_record().await? {
                Some(record) => self.pending = Some(record),
                None => return Ok(Vec::new()),
            }
        }
    }

    async fn next_record(&mut self) -> MediaResult<Option<FrameDetections>> {
        while !self.exhausted {
            let Some(line) = self.lines.next_line().await? else {
                self.exhausted = true;
                break;
            };
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<FrameDetections>(trimmed) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    self.malformed += 1;
                    let err = MediaError::MalformedDetections(format!(
                        "{}:{}: {e}",
                        self.path.display(),
                        self.line_no
                    ));
                    warn!(error = %err, "Skipping detection record");
                }
            }
        }
        Ok(None)
    }
}
