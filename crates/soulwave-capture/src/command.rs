use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

use async_trait::async_trait;
use soulwave_types::{telemetry::SourceMetrics, vision::ImageFrame, Result};
use tokio::process::Command;

use crate::{capture_error, decode_frame, record_failure, record_read, VideoSource};

/// Grabs frames by running an external program that writes one still image to stdout,
/// e.g. `ffmpeg -f v4l2 -i /dev/video0 -frames:v 1 -f image2pipe -vcodec png -`.
pub struct CommandSource {
    program: PathBuf,
    args: Vec<String>,
    ready: AtomicBool,
    metrics: Arc<Mutex<SourceMetrics>>,
}

impl CommandSource {
    pub fn new(command: Vec<String>) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| capture_error("command source requires a program"))?;

        Ok(Self {
            program,
            args: parts.collect(),
            ready: AtomicBool::new(false),
            metrics: Arc::new(Mutex::new(SourceMetrics::default())),
        })
    }

    async fn run_grabber(&self) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|err| {
                capture_error(format!(
                    "failed to run frame grabber {:?}: {err}",
                    self.program
                ))
            })?;

        if output.status.success() && !output.stdout.is_empty() {
            Ok(output.stdout)
        } else {
            Err(capture_error(format!(
                "frame grabber {:?} failed ({}): {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn grab(&self) -> Result<ImageFrame> {
        let start = Instant::now();
        let result = match self.run_grabber().await {
            Ok(raw) => decode_frame(&raw),
            Err(err) => Err(err),
        };
        match result {
            Ok(frame) => {
                record_read(&self.metrics, start);
                Ok(frame)
            }
            Err(err) => {
                record_failure(&self.metrics);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl VideoSource for CommandSource {
    async fn connect(&mut self) -> Result<()> {
        tracing::info!("Probing frame grabber {:?}", self.program);
        self.ready.store(false, Ordering::SeqCst);
        let frame = self.grab().await?;
        tracing::info!(
            "Frame grabber ready at native resolution {}x{}",
            frame.width,
            frame.height
        );
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn read_frame(&self) -> Result<ImageFrame> {
        self.grab().await
    }

    fn metrics(&self) -> SourceMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}
