//! Video source abstraction layer.

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use async_trait::async_trait;
use soulwave_types::{
    config::{CaptureConfig, SourceKind},
    telemetry::SourceMetrics,
    vision::ImageFrame,
    Result, SoulwaveError,
};
use tracing::info;

mod command;
mod still;

pub use command::CommandSource;
pub use still::StillImageSource;

#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Acquire the underlying media. Failure leaves the source not ready.
    async fn connect(&mut self) -> Result<()>;
    /// True once the source is playing and has at least one decoded frame.
    fn is_ready(&self) -> bool;
    async fn read_frame(&self) -> Result<ImageFrame>;
    fn metrics(&self) -> SourceMetrics;
}

#[async_trait]
impl<T: VideoSource + ?Sized> VideoSource for Box<T> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    async fn read_frame(&self) -> Result<ImageFrame> {
        (**self).read_frame().await
    }

    fn metrics(&self) -> SourceMetrics {
        (**self).metrics()
    }
}

/// Synthetic gradient source used for development and testing.
pub struct MockSource {
    width: u32,
    height: u32,
    connected: bool,
    metrics: Arc<Mutex<SourceMetrics>>,
}

impl MockSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            connected: false,
            metrics: Arc::new(Mutex::new(SourceMetrics::default())),
        }
    }

    fn render(&self) -> ImageFrame {
        let (w, h) = (self.width.max(1), self.height.max(1));
        let mut data = Vec::with_capacity(w as usize * h as usize * 4);
        for y in 0..h {
            for x in 0..w {
                data.push((x * 255 / w) as u8);
                data.push((y * 255 / h) as u8);
                data.push(128);
                data.push(255);
            }
        }
        ImageFrame::from_rgba(w, h, data)
    }
}

#[async_trait]
impl VideoSource for MockSource {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting mock video source {}x{}", self.width, self.height);
        self.connected = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected
    }

    async fn read_frame(&self) -> Result<ImageFrame> {
        if !self.connected {
            return Err(capture_error("mock source is not connected"));
        }
        let start = Instant::now();
        let frame = self.render();
        record_read(&self.metrics, start);
        Ok(frame)
    }

    fn metrics(&self) -> SourceMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

/// Build the source selected in the capture config.
pub fn build_source(config: &CaptureConfig) -> Result<Box<dyn VideoSource>> {
    match config.source {
        SourceKind::Mock => {
            let (w, h) = config.mock_resolution;
            Ok(Box::new(MockSource::new(w, h)))
        }
        SourceKind::Still => {
            let path = config
                .still_path
                .clone()
                .ok_or_else(|| capture_error("still source requires capture.still_path"))?;
            Ok(Box::new(StillImageSource::new(path)))
        }
        SourceKind::Command => Ok(Box::new(CommandSource::new(config.command.clone())?)),
    }
}

/// Decode a PNG/JPEG still into an RGBA frame.
pub fn decode_frame(bytes: &[u8]) -> Result<ImageFrame> {
    let img = image::load_from_memory(bytes)
        .map_err(|err| capture_error(format!("failed to decode frame: {err}")))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImageFrame::from_rgba(width, height, rgba.into_raw()))
}

pub(crate) fn record_read(metrics: &Mutex<SourceMetrics>, start: Instant) {
    if let Ok(mut guard) = metrics.lock() {
        guard.frames_read += 1;
        guard.last_read_ms = Some(start.elapsed().as_millis() as u64);
    }
}

pub(crate) fn record_failure(metrics: &Mutex<SourceMetrics>) {
    if let Ok(mut guard) = metrics.lock() {
        guard.failed_reads += 1;
    }
}

/// Generate an error aligned with capture semantics.
pub fn capture_error(message: impl Into<String>) -> SoulwaveError {
    SoulwaveError::Capture(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgba};
    use std::io::Cursor;

    #[tokio::test]
    async fn mock_source_is_ready_only_after_connect() {
        let mut source = MockSource::new(8, 4);
        assert!(!source.is_ready());
        assert!(source.read_frame().await.is_err());

        source.connect().await.expect("connect");
        assert!(source.is_ready());
        let frame = source.read_frame().await.expect("frame");
        assert_eq!((frame.width, frame.height), (8, 4));
        assert!(frame.is_consistent());
        assert_eq!(source.metrics().frames_read, 1);
    }

    #[test]
    fn decode_png_into_rgba_frame() {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .expect("encode png");

        let frame = decode_frame(bytes.get_ref()).expect("decode");
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.pixel(2, 1), Some([10, 20, 30, 255]));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_frame(b"not an image").is_err());
    }

    #[test]
    fn build_source_requires_still_path() {
        let config = CaptureConfig {
            source: SourceKind::Still,
            ..CaptureConfig::default()
        };
        assert!(build_source(&config).is_err());
    }
}
