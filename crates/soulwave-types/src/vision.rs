use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bytes per RGBA8 pixel.
pub const RGBA_CHANNELS: usize = 4;

/// One frame sampled from a video source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    /// Raw RGBA pixel buffer, row-major.
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl ImageFrame {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the buffer length agrees with the advertised dimensions.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.pixel_count() * RGBA_CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * RGBA_CHANNELS;
        let px = self.data.get(offset..offset + RGBA_CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// A frame whose red, green and blue samples all carry the same luminance.
#[derive(Debug, Clone)]
pub struct GrayscaleFrame {
    frame: ImageFrame,
}

impl GrayscaleFrame {
    /// Wraps a frame that already satisfies R == G == B for every pixel.
    ///
    /// Returns `None` if any pixel violates the invariant or the buffer is malformed.
    pub fn new(frame: ImageFrame) -> Option<Self> {
        if !frame.is_consistent() {
            return None;
        }
        let uniform = frame
            .data
            .chunks_exact(RGBA_CHANNELS)
            .all(|px| px[0] == px[1] && px[1] == px[2]);
        uniform.then_some(Self { frame })
    }

    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn luma_at(&self, x: u32, y: u32) -> Option<u8> {
        self.frame.pixel(x, y).map(|px| px[0])
    }

    pub fn as_frame(&self) -> &ImageFrame {
        &self.frame
    }
}

/// Compressed still ready to be attached to an outgoing request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
    pub captured_at: DateTime<Utc>,
}

impl EncodedImage {
    pub const JPEG_MIME: &'static str = "image/jpeg";

    pub fn jpeg(bytes: Vec<u8>, width: u32, height: u32, captured_at: DateTime<Utc>) -> Self {
        Self {
            bytes,
            width,
            height,
            mime_type: Self::JPEG_MIME,
            captured_at,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of a single capture attempt. Callers fall back to a neutral emotion
/// on anything other than `Captured`.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Captured(EncodedImage),
    NotReady,
    Failed(String),
}

impl CaptureOutcome {
    pub fn image(&self) -> Option<&EncodedImage> {
        match self {
            CaptureOutcome::Captured(image) => Some(image),
            _ => None,
        }
    }

    pub fn into_image(self) -> Option<EncodedImage> {
        match self {
            CaptureOutcome::Captured(image) => Some(image),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CaptureOutcome::Captured(_) => "captured",
            CaptureOutcome::NotReady => "not_ready",
            CaptureOutcome::Failed(_) => "failed",
        }
    }
}
