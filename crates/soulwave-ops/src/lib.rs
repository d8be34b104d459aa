//! Operational helpers: logging, telemetry capture and persistence.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use soulwave_types::{
    config::OpsConfig,
    events::SystemEvent,
    telemetry::{SessionTelemetry, TurnLatency},
    Result, SoulwaveError,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))?;

    match &config.log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
                .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
        }
    }
    Ok(())
}

fn open_log_file(path: &str) -> Result<File> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| ops_error(format!("failed to create log dir: {err}")))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| ops_error(format!("failed to open log file {path}: {err}")))
}

/// In-memory telemetry store shared between the session and the UI.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    events: Arc<Mutex<Vec<SystemEvent>>>,
    session: Arc<Mutex<SessionTelemetry>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_event(&self, event: SystemEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    pub async fn record_turn(
        &self,
        latency: TurnLatency,
        neutral_fallback: bool,
        chat_failed: bool,
    ) -> Result<()> {
        let mut session = self.session.lock().await;
        session.turns.push(latency);
        if neutral_fallback {
            session.neutral_fallbacks += 1;
        }
        if chat_failed {
            session.chat_failures += 1;
        }
        Ok(())
    }

    pub async fn snapshot_events(&self) -> Vec<SystemEvent> {
        self.events.lock().await.clone()
    }

    pub async fn snapshot_session(&self) -> SessionTelemetry {
        self.session.lock().await.clone()
    }

    /// Write recorded events as JSON lines and the session summary as JSON.
    pub async fn persist(&self, dir: &Path) -> Result<PathBuf> {
        let events = self.snapshot_events().await;
        let session = self.snapshot_session().await;

        let stamp = file_stamp(&events);
        let events_path = dir.join(format!("events_{stamp}.jsonl"));
        let file = File::create(&events_path)
            .map_err(|err| ops_error(format!("failed to create {:?}: {err}", events_path)))?;
        let mut writer = BufWriter::new(file);
        for event in &events {
            let line = serde_json::to_string(event)
                .map_err(|err| ops_error(format!("failed to serialize event: {err}")))?;
            writeln!(writer, "{line}")
                .map_err(|err| ops_error(format!("failed to write event: {err}")))?;
        }
        writer
            .flush()
            .map_err(|err| ops_error(format!("failed to flush events: {err}")))?;

        let summary = serde_json::to_vec_pretty(&session)
            .map_err(|err| ops_error(format!("failed to serialize session: {err}")))?;
        fs::write(dir.join(format!("session_{stamp}.json")), summary)
            .map_err(|err| ops_error(format!("failed to write session summary: {err}")))?;

        info!("Persisted {} events to {:?}", events.len(), events_path);
        Ok(events_path)
    }
}

fn file_stamp(events: &[SystemEvent]) -> String {
    events
        .first()
        .map(|e| e.timestamp.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| "empty".to_string())
}

pub fn ensure_telemetry_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    fs::create_dir_all(&dir)
        .map_err(|err| ops_error(format!("failed to create telemetry dir: {err}")))?;
    info!("Telemetry directory ready at {:?}", dir);
    Ok(dir)
}

pub fn ops_error(message: impl Into<String>) -> SoulwaveError {
    SoulwaveError::Ops(message.into())
}
