//! Decoded video frames.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::{MediaError, MediaResult};

/// A decoded RGB frame with its position in the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 0-based index within the stream.
    pub index: u64,
    /// Presentation time in milliseconds since stream start.
    pub timestamp_ms: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp_ms: u64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp_ms,
            image,
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb24(
        index: u64,
        timestamp_ms: u64,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> MediaResult<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(MediaError::input_decode(format!(
                "Invalid frame data length: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| MediaError::input_decode("Failed to create image buffer"))?;
        Ok(Self::new(index, timestamp_ms, image))
    }

    /// Decode an encoded image (JPEG, PNG, ...) held in memory.
    pub fn decode(index: u64, timestamp_ms: u64, bytes: &[u8]) -> MediaResult<Self> {
        if bytes.is_empty() {
            return Err(MediaError::input_decode("Could not decode frame: empty input"));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| MediaError::input_decode(format!("Could not decode frame: {e}")))?;
        Ok(Self::new(index, timestamp_ms, image.to_rgb8()))
    }

    /// Read and decode an image file.
    pub fn open(index: u64, timestamp_ms: u64, path: &Path) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let image = image::open(path).map_err(|e| {
            MediaError::input_decode(format!("Could not read frame from {}: {e}", path.display()))
        })?;
        Ok(Self::new(index, timestamp_ms, image.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Luma conversion used by all grayscale extractors.
    pub fn to_gray(&self) -> GrayImage {
        DynamicImage::ImageRgb8(self.image.clone()).to_luma8()
    }
}
