//! Ordered frame sources.
//!
//! A [`VideoSource`] yields frames strictly in arrival order and signals end
//! of stream with `Ok(None)`. A frame-level decode error does not end the
//! stream: the source advances past the bad frame and the caller decides
//! whether to continue.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::probe::{probe_video, VideoInfo};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// A stream of decoded frames.
#[async_trait]
pub trait VideoSource: Send {
    /// Stream metadata (dimensions of decoded frames and frame rate).
    fn info(&self) -> VideoInfo;

    /// Next frame, `Ok(None)` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Human-readable name for logging.
    fn describe(&self) -> String;
}

/// Open a source: directories are read as image sequences, anything else
/// is decoded through FFmpeg.
pub async fn open_source(
    input: &str,
    fallback_fps: f64,
    max_width: Option<u32>,
) -> MediaResult<Box<dyn VideoSource>> {
    let path = Path::new(input);
    if path.is_dir() {
        Ok(Box::new(ImageDirSource::open(path, fallback_fps)?))
    } else {
        Ok(Box::new(FfmpegSource::open(input, max_width).await?))
    }
}

/// Video decoded by an FFmpeg child process writing raw RGB24 frames.
pub struct FfmpegSource {
    input: String,
    info: VideoInfo,
    child: Child,
    stdout: ChildStdout,
    frame_size: usize,
    next_index: u64,
    finished: bool,
}

impl FfmpegSource {
    /// Probe and start decoding `input` (file path or URL).
    ///
    /// Frames wider than `max_width` are scaled down by FFmpeg, keeping the
    /// aspect ratio.
    pub async fn open(input: &str, max_width: Option<u32>) -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        let mut info = probe_video(input).await?;

        if let Some(max_width) = max_width.filter(|w| *w > 0 && *w < info.width) {
            let scale = max_width as f64 / info.width as f64;
            info.width = max_width;
            // even height keeps rgb24 scaling filters happy
            info.height = (((info.height as f64 * scale) / 2.0).round() as u32 * 2).max(2);
        }

        let scale_filter = format!("scale={}:{}", info.width, info.height);
        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args([
                "-vf",
                scale_filter.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::InvalidSource("FFmpeg stdout unavailable".to_string()))?;

        info!(
            input = input,
            width = info.width,
            height = info.height,
            fps = info.fps,
            "FFmpeg source opened"
        );

        Ok(Self {
            input: input.to_string(),
            info,
            child,
            stdout,
            frame_size: info.width as usize * info.height as usize * 3,
            next_index: 0,
            finished: false,
        })
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.frame_size];
        match self.stdout.read_exact(&mut buffer).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finished = true;
                let status = self.child.wait().await?;
                debug!(input = %self.input, ?status, "FFmpeg source reached end of stream");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let index = self.next_index;
        self.next_index += 1;
        let frame = Frame::from_rgb24(
            index,
            self.info.timestamp_ms(index),
            self.info.width,
            self.info.height,
            buffer,
        )?;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("ffmpeg:{}", self.input)
    }
}

/// Ordered directory of still images, one frame per file.
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    info: VideoInfo,
    cursor: usize,
}

impl ImageDirSource {
    /// List image files in `dir`, sorted by file name.
    pub fn open(dir: &Path, fps: f64) -> MediaResult<Self> {
        if !dir.is_dir() {
            return Err(MediaError::FileNotFound(dir.to_path_buf()));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        let first = files.first().ok_or_else(|| {
            MediaError::InvalidSource(format!("No images found in {}", dir.display()))
        })?;
        let (width, height) = image::image_dimensions(first)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            info: VideoInfo {
                width,
                height,
                fps: if fps > 0.0 { fps } else { 30.0 },
                duration: 0.0,
            },
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl VideoSource for ImageDirSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor).cloned() else {
            return Ok(None);
        };
        let index = self.cursor as u64;
        self.cursor += 1;

        let timestamp_ms = self.info.timestamp_ms(index);
        let frame = tokio::task::spawn_blocking(move || Frame::open(index, timestamp_ms, &path))
            .await
            .map_err(|e| MediaError::input_decode(format!("decode task failed: {e}")))?;

        if let Err(ref e) = frame {
            warn!(dir = %self.dir.display(), index, error = %e, "Skipping undecodable image");
        }
        frame.map(Some)
    }

    fn describe(&self) -> String {
        format!("images:{}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, shade: u8) {
        RgbImage::from_pixel(16, 12, Rgb([shade, shade, shade]))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn test_image_dir_yields_sorted_frames_then_end() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "frame_002.png", 20);
        write_png(dir.path(), "frame_001.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::open(dir.path(), 10.0).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.info().width, 16);

        let first = source.next_frame().await.unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.image.get_pixel(0, 0)[0], 10);

        let second = source.next_frame().await.unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.timestamp_ms, 100);

        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_image_dir_skips_bad_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("b.png"), b"broken").unwrap();
        write_png(dir.path(), "c.png", 30);

        let mut source = ImageDirSource::open(dir.path(), 30.0).unwrap();
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(source.next_frame().await.is_err());
        let third = source.next_frame().await.unwrap().unwrap();
        assert_eq!(third.index, 2);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_ffmpeg_source_decodes_test_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("pattern.mp4");
        let status = std::process::Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i"])
            .arg("testsrc=size=160x120:rate=10:duration=1")
            .args(["-pix_fmt", "yuv420p"])
            .arg(&video)
            .status()
            .unwrap();
        assert!(status.success());

        let mut source = FfmpegSource::open(video.to_str().unwrap(), Some(80)).await.unwrap();
        assert_eq!((source.info().width, source.info().height), (80, 60));

        let mut frames = 0;
        while let Some(frame) = source.next_frame().await.unwrap() {
            assert_eq!(frame.index, frames);
            assert_eq!(frame.width(), 80);
            frames += 1;
        }
        assert_eq!(frames, 10);
    }

    #[test]
    fn test_empty_dir_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageDirSource::open(dir.path(), 30.0),
            Err(MediaError::InvalidSource(_))
        ));
    }
}
