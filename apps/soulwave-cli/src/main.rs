use std::{
    env,
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use soulwave_capture::{build_source, VideoSource};
use soulwave_network::{
    gateway::{self, GatewayState},
    LocalServer, RealtimeServer,
};
use soulwave_ops::{ensure_telemetry_dir, init_tracing, TelemetryStore};
use soulwave_orchestrator::{ChatSession, SessionSettings};
use soulwave_remote::{
    HttpChatBackend, HttpDetectProxy, HttpEmotionDetector, HttpUserDirectory, UserDirectory,
};
use soulwave_types::{config::SoulwaveConfig, vision::CaptureOutcome};
use soulwave_vision::FrameCapture;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{info, warn};

mod ui;

use ui::{UiCommand, UiMessage};

const DEFAULT_CONFIG_PATH: &str = "configs/dev.toml";
const EVENT_BUS_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "soulwave", version, about = "Webcam-driven, emotion-aware chat client")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "SOULWAVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat in the terminal (default).
    Chat,
    /// Grab one grayscale still from the configured source and write it as JPEG.
    Capture {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Run the HTTP gateway.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref());

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            if config.ops.log_file.is_none() {
                config.ops.log_file = Some(format!("{}/soulwave.log", config.ops.telemetry_dir));
            }
            init_tracing(&config.ops)?;
            run_chat(config).await
        }
        Command::Capture { output } => {
            init_tracing(&config.ops)?;
            run_capture(&config, &output).await
        }
        Command::Serve => {
            init_tracing(&config.ops)?;
            run_gateway(&config).await
        }
    }
}

async fn run_chat(config: SoulwaveConfig) -> Result<()> {
    let telemetry_dir = ensure_telemetry_dir(&config.ops.telemetry_dir)?;
    let client = reqwest::Client::new();

    let source = build_source(&config.capture)?;
    let capture = FrameCapture::from_config(&config.capture, &config.vision);
    let detector = HttpEmotionDetector::new(client.clone(), config.detector.url.clone());
    let chat = HttpChatBackend::new(client, config.chat.url.clone());
    let network = LocalServer::new(EVENT_BUS_CAPACITY);
    let telemetry = TelemetryStore::new();

    let (ui_tx, ui_rx) = mpsc::channel();
    let (cmd_tx, mut cmd_rx) = tokio_mpsc::unbounded_channel();

    // Subscribe before boot so the UI sees the welcome message.
    let mut events = network.subscribe();
    let event_tx = ui_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event_tx.send(UiMessage::Event(event)).is_err() {
                break;
            }
        }
    });

    let summary = config.summary();
    let ui_handle = thread::spawn(move || ui::run(ui_rx, cmd_tx, summary));

    let mut session = ChatSession::new(
        SessionSettings::from(&config.chat),
        source,
        capture,
        detector,
        chat,
        network,
        telemetry.clone(),
    );
    session.boot().await?;
    session.start_chatting(config.profile.as_ref()).await?;

    while let Some(command) = cmd_rx.recv().await {
        match command {
            UiCommand::Send(text) => {
                if let Err(err) = session.send(&text).await {
                    warn!("Chat turn aborted: {err}");
                }
            }
            UiCommand::Quit => break,
        }
    }

    session.shutdown().await?;
    let source_metrics = session.source().metrics();
    let _ = ui_tx.send(UiMessage::Shutdown);
    drop(ui_tx);
    drop(session);
    forwarder.abort();

    match ui_handle.join() {
        Ok(result) => result?,
        Err(_) => warn!("UI thread panicked"),
    }

    let path = telemetry.persist(&telemetry_dir).await?;
    let stats = telemetry.snapshot_session().await;
    info!(
        turns = stats.turns.len(),
        mean_turn_ms = stats.mean_total_ms().unwrap_or_default(),
        neutral_fallbacks = stats.neutral_fallbacks,
        chat_failures = stats.chat_failures,
        frames_read = source_metrics.frames_read,
        failed_reads = source_metrics.failed_reads,
        "Session telemetry written to {:?}",
        path
    );
    Ok(())
}

async fn run_capture(config: &SoulwaveConfig, output: &Path) -> Result<()> {
    let mut source = build_source(&config.capture)?;
    source
        .connect()
        .await
        .context("video source could not be acquired")?;

    let mut capture = FrameCapture::from_config(&config.capture, &config.vision);
    match capture.capture(&source).await {
        CaptureOutcome::Captured(image) => {
            std::fs::write(output, &image.bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Wrote {}x{} grayscale JPEG ({} bytes) to {}",
                image.width,
                image.height,
                image.len(),
                output.display()
            );
            Ok(())
        }
        CaptureOutcome::NotReady => bail!("video source is not ready"),
        CaptureOutcome::Failed(reason) => bail!("capture failed: {reason}"),
    }
}

async fn run_gateway(config: &SoulwaveConfig) -> Result<()> {
    let client = reqwest::Client::new();

    let directory = config.identity.url.as_ref().map(|url| {
        let key = env::var(&config.identity.service_key_env).unwrap_or_else(|_| {
            warn!(
                "{} is not set; user checks will fail",
                config.identity.service_key_env
            );
            String::new()
        });
        Arc::new(HttpUserDirectory::new(client.clone(), url.clone(), key)) as Arc<dyn UserDirectory>
    });
    if directory.is_none() {
        warn!("identity.url is not configured; /api/check_user will answer 500");
    }

    let state = GatewayState {
        directory,
        proxy: Arc::new(HttpDetectProxy::new(
            client,
            config.gateway.detect_upstream.clone(),
        )),
    };
    gateway::serve(&config.gateway, state).await?;
    Ok(())
}

fn load_config(explicit: Option<&Path>) -> SoulwaveConfig {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if explicit.is_none() && !path.exists() {
        return SoulwaveConfig::default();
    }

    match SoulwaveConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            default_config()
        }
    }
}

fn default_config() -> SoulwaveConfig {
    let config = SoulwaveConfig::default();
    debug_assert!(config.validate().is_ok());
    config
}
