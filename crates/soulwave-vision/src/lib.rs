//! Frame capture and grayscale still encoding.

use std::{fs, path::PathBuf};

use chrono::Utc;
use soulwave_capture::VideoSource;
use soulwave_types::{
    config::{CaptureConfig, VisionConfig},
    vision::{CaptureOutcome, EncodedImage, GrayscaleFrame, ImageFrame},
    Result, SoulwaveError,
};
use tracing::{debug, info, warn};

mod encode;
mod luma;
mod raster;

pub use encode::encode_jpeg;
pub use luma::{apply_grayscale, clamp_sample, luminance};
pub use raster::RasterBuffer;

/// Default JPEG quality on the encoder's 1-100 scale.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Turns the current frame of a video source into a grayscale JPEG.
///
/// Owns the raster buffer it draws into; the buffer follows the source's
/// native resolution from one capture to the next.
pub struct FrameCapture {
    buffer: RasterBuffer,
    quality: u8,
    capture_dir: Option<PathBuf>,
}

impl FrameCapture {
    pub fn new(quality: u8) -> Self {
        Self {
            buffer: RasterBuffer::new(),
            quality: quality.clamp(1, 100),
            capture_dir: None,
        }
    }

    pub fn from_config(capture: &CaptureConfig, vision: &VisionConfig) -> Self {
        let mut this = Self::new(capture.jpeg_quality);
        this.capture_dir = vision.capture_dir.as_ref().map(PathBuf::from);
        this
    }

    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = Some(dir.into());
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    /// Capture one frame. Never fails outright: an unready source yields
    /// `NotReady` and any read or encode error yields `Failed`.
    pub async fn capture<S: VideoSource + ?Sized>(&mut self, source: &S) -> CaptureOutcome {
        if !source.is_ready() {
            debug!("Video source not ready; skipping capture");
            return CaptureOutcome::NotReady;
        }

        let frame = match source.read_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Frame read failed: {err}");
                return CaptureOutcome::Failed(err.to_string());
            }
        };

        match self.process(&frame) {
            Ok(image) => {
                match self.persist_capture(&image) {
                    Ok(Some(path)) => info!("Saved capture to {:?}", path),
                    Ok(None) => {}
                    Err(err) => warn!("Could not save capture: {err}"),
                }
                CaptureOutcome::Captured(image)
            }
            Err(err) => {
                warn!("Grayscale encode failed: {err}");
                CaptureOutcome::Failed(err.to_string())
            }
        }
    }

    /// Resize, draw, convert to luminance, and encode a single frame.
    pub fn process(&mut self, frame: &ImageFrame) -> Result<EncodedImage> {
        if frame.is_empty() {
            return Err(vision_error("source produced an empty frame"));
        }
        if self.buffer.resize(frame.width, frame.height) {
            debug!(
                "Raster buffer resized to {}x{}",
                frame.width, frame.height
            );
        }
        self.buffer.draw(frame)?;
        apply_grayscale(self.buffer.pixels_mut());

        let (width, height) = self.buffer.dimensions();
        let bytes = encode_jpeg(width, height, self.buffer.pixels(), self.quality)?;
        debug!(
            "Encoded {}x{} grayscale still ({} bytes, quality {})",
            width,
            height,
            bytes.len(),
            self.quality
        );
        Ok(EncodedImage::jpeg(bytes, width, height, frame.captured_at))
    }

    /// Grayscale contents of the buffer after the last successful capture.
    pub fn last_grayscale(&self) -> Option<GrayscaleFrame> {
        GrayscaleFrame::new(self.buffer.to_frame(Utc::now()))
    }

    fn persist_capture(&self, image: &EncodedImage) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.capture_dir else {
            return Ok(None);
        };

        fs::create_dir_all(dir)
            .map_err(|err| vision_error(format!("failed to create capture dir {:?}: {err}", dir)))?;
        let timestamp = image.captured_at.format("%Y%m%d_%H%M%S_%3f");
        let path = dir.join(format!("frame_{}.jpg", timestamp));
        fs::write(&path, &image.bytes)
            .map_err(|err| vision_error(format!("failed to save capture: {err}")))?;
        Ok(Some(path))
    }
}

impl Default for FrameCapture {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

pub fn vision_error(message: impl Into<String>) -> SoulwaveError {
    SoulwaveError::Vision(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use soulwave_capture::capture_error;
    use soulwave_types::telemetry::SourceMetrics;

    struct FixedSource {
        ready: bool,
        frame: Option<ImageFrame>,
    }

    #[async_trait]
    impl VideoSource for FixedSource {
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        async fn read_frame(&self) -> Result<ImageFrame> {
            self.frame
                .clone()
                .ok_or_else(|| capture_error("no frame decoded"))
        }

        fn metrics(&self) -> SourceMetrics {
            SourceMetrics::default()
        }
    }

    fn red_frame(width: u32, height: u32) -> ImageFrame {
        ImageFrame::from_rgba(width, height, [255, 0, 0, 255].repeat((width * height) as usize))
    }

    #[tokio::test]
    async fn not_ready_source_yields_not_ready() {
        let source = FixedSource {
            ready: false,
            frame: Some(red_frame(4, 4)),
        };
        let mut capture = FrameCapture::default();
        assert!(matches!(
            capture.capture(&source).await,
            CaptureOutcome::NotReady
        ));
    }

    #[tokio::test]
    async fn read_error_yields_failed() {
        let source = FixedSource {
            ready: true,
            frame: None,
        };
        let mut capture = FrameCapture::default();
        match capture.capture(&source).await {
            CaptureOutcome::Failed(reason) => assert!(reason.contains("no frame decoded")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_frame_yields_failed() {
        let source = FixedSource {
            ready: true,
            frame: Some(ImageFrame::empty()),
        };
        let mut capture = FrameCapture::default();
        assert!(matches!(
            capture.capture(&source).await,
            CaptureOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn buffer_follows_native_resolution() {
        let mut capture = FrameCapture::default();
        capture.buffer.resize(640, 480);

        let source = FixedSource {
            ready: true,
            frame: Some(red_frame(32, 18)),
        };
        let image = capture
            .capture(&source)
            .await
            .into_image()
            .expect("captured");
        assert_eq!((image.width, image.height), (32, 18));
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(capture.buffer().dimensions(), (32, 18));

        let decoded = image::load_from_memory(&image.bytes)
            .expect("decode")
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (32, 18));
    }

    #[tokio::test]
    async fn buffer_holds_rec709_gray_after_capture() {
        let source = FixedSource {
            ready: true,
            frame: Some(red_frame(2, 2)),
        };
        let mut capture = FrameCapture::new(90);
        assert!(capture.capture(&source).await.image().is_some());

        let gray = capture.last_grayscale().expect("uniform buffer");
        assert_eq!(gray.luma_at(1, 1), Some(54));
        assert_eq!(&capture.buffer().pixels()[..4], &[54, 54, 54, 255]);
    }

    #[tokio::test]
    async fn capture_dir_receives_jpeg() {
        let dir = std::env::temp_dir().join(format!(
            "soulwave-capture-dir-{}",
            std::process::id()
        ));
        let source = FixedSource {
            ready: true,
            frame: Some(red_frame(3, 3)),
        };
        let mut capture = FrameCapture::new(80).with_capture_dir(&dir);
        assert!(capture.capture(&source).await.image().is_some());

        let saved: Vec<_> = fs::read_dir(&dir).expect("read dir").collect();
        assert_eq!(saved.len(), 1);
        fs::remove_dir_all(&dir).expect("cleanup capture dir");
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(FrameCapture::new(0).quality(), 1);
        assert_eq!(FrameCapture::new(250).quality(), 100);
    }
}
