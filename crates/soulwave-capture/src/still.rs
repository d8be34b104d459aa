use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};

use async_trait::async_trait;
use chrono::Utc;
use soulwave_types::{telemetry::SourceMetrics, vision::ImageFrame, Result};
use tracing::info;

use crate::{capture_error, decode_frame, record_read, VideoSource};

/// Serves the same image file as every frame.
pub struct StillImageSource {
    path: PathBuf,
    frame: Option<ImageFrame>,
    metrics: Arc<Mutex<SourceMetrics>>,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame: None,
            metrics: Arc::new(Mutex::new(SourceMetrics::default())),
        }
    }
}

#[async_trait]
impl VideoSource for StillImageSource {
    async fn connect(&mut self) -> Result<()> {
        let raw = tokio::fs::read(&self.path).await.map_err(|err| {
            capture_error(format!("unable to read still image {:?}: {err}", self.path))
        })?;
        let frame = decode_frame(&raw)?;
        info!(
            "Loaded still image {:?} ({}x{})",
            self.path, frame.width, frame.height
        );
        self.frame = Some(frame);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.frame.is_some()
    }

    async fn read_frame(&self) -> Result<ImageFrame> {
        let start = Instant::now();
        let mut frame = self
            .frame
            .clone()
            .ok_or_else(|| capture_error("still image has not been loaded"))?;
        frame.captured_at = Utc::now();
        record_read(&self.metrics, start);
        Ok(frame)
    }

    fn metrics(&self) -> SourceMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    #[tokio::test]
    async fn loads_file_at_native_resolution() {
        let path = std::env::temp_dir().join("soulwave-still-source-test.png");
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(5, 7, Rgba([200, 100, 50, 255]));
        img.save(&path).expect("write fixture");

        let mut source = StillImageSource::new(&path);
        assert!(!source.is_ready());
        source.connect().await.expect("connect");
        assert!(source.is_ready());

        let frame = source.read_frame().await.expect("frame");
        assert_eq!((frame.width, frame.height), (5, 7));
        assert_eq!(frame.pixel(0, 0), Some([200, 100, 50, 255]));
        std::fs::remove_file(&path).expect("cleanup fixture");
    }

    #[tokio::test]
    async fn missing_file_is_not_ready() {
        let mut source = StillImageSource::new("/nonexistent/soulwave/face.png");
        assert!(source.connect().await.is_err());
        assert!(!source.is_ready());
        assert!(source.read_frame().await.is_err());
    }
}
