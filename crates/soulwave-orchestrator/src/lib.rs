//! Chat session pipeline: capture, detect emotion, then ask the chat backend.

use std::time::Instant;

use chrono::Utc;
use soulwave_capture::VideoSource;
use soulwave_network::RealtimeServer;
use soulwave_ops::TelemetryStore;
use soulwave_remote::{ChatBackend, EmotionDetector};
use soulwave_types::{
    chat::{ChatMessage, ChatThread, EmotionLabel, UserProfile},
    config::ChatConfig,
    events::{
        CaptureEvent, ChatEvent, EmotionEvent, EventKind, EventPayload, LifecyclePhase,
        OpsEvent, SystemEvent, TelemetryEvent,
    },
    telemetry::TurnLatency,
    vision::CaptureOutcome,
    Result,
};
use soulwave_vision::FrameCapture;
use tracing::{info, warn};

/// Session behaviour that does not depend on the collaborators.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Bot text appended when the chat backend cannot answer.
    pub fallback_message: String,
}

impl From<&ChatConfig> for SessionSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            fallback_message: config.fallback_message.clone(),
        }
    }
}

/// Stage-one result carried into the chat request.
#[derive(Debug, Clone)]
pub struct EmotionResolution {
    pub label: EmotionLabel,
    pub confidence: Option<f32>,
    /// True when the label is the neutral default rather than a detection.
    pub fallback: bool,
}

impl EmotionResolution {
    fn neutral() -> Self {
        Self {
            label: EmotionLabel::neutral(),
            confidence: None,
            fallback: true,
        }
    }
}

/// Everything that happened during one `send`.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub user: ChatMessage,
    pub reply: ChatMessage,
    pub emotion: EmotionResolution,
    pub capture: &'static str,
    pub chat_failed: bool,
    pub latency: TurnLatency,
}

pub struct ChatSession<S, D, C, N>
where
    S: VideoSource,
    D: EmotionDetector,
    C: ChatBackend,
    N: RealtimeServer,
{
    source: S,
    capture: FrameCapture,
    detector: D,
    chat: C,
    network: N,
    telemetry: TelemetryStore,
    settings: SessionSettings,
    thread: ChatThread,
}

impl<S, D, C, N> ChatSession<S, D, C, N>
where
    S: VideoSource,
    D: EmotionDetector,
    C: ChatBackend,
    N: RealtimeServer,
{
    pub fn new(
        settings: SessionSettings,
        source: S,
        capture: FrameCapture,
        detector: D,
        chat: C,
        network: N,
        telemetry: TelemetryStore,
    ) -> Self {
        Self {
            source,
            capture,
            detector,
            chat,
            network,
            telemetry,
            settings,
            thread: ChatThread::new(),
        }
    }

    /// Connect the video source and announce the session. A source that cannot
    /// be acquired is reported as an ops event and stays not ready.
    pub async fn boot(&mut self) -> Result<()> {
        let acquire_error = self.source.connect().await.err();
        self.network.run().await?;
        if let Some(err) = acquire_error {
            warn!("Video source unavailable, continuing without video: {err}");
            self.publish(SystemEvent::new(
                EventKind::Ops,
                EventPayload::Ops(OpsEvent {
                    message: format!("video source unavailable: {err}"),
                    tags: vec!["capture".into(), "degraded".into()],
                }),
            ))
            .await?;
        }
        let details = if self.source.is_ready() {
            "session boot complete"
        } else {
            "session boot complete without video"
        };
        self.publish(SystemEvent::lifecycle(LifecyclePhase::Boot, details))
            .await
    }

    /// Open the conversation, greeting the user by name when known.
    pub async fn start_chatting(
        &mut self,
        profile: Option<&UserProfile>,
    ) -> Result<Option<ChatMessage>> {
        self.publish(SystemEvent::lifecycle(
            LifecyclePhase::SessionStart,
            "chat started",
        ))
        .await?;

        let Some(profile) = profile else {
            return Ok(None);
        };
        let welcome = profile.welcome_message();
        self.append(welcome.clone(), false).await?;
        Ok(Some(welcome))
    }

    /// Run one chat turn. Blank input is ignored and returns `None`.
    ///
    /// The user message is appended first, then the bot reply (or the fallback
    /// text), so the thread always reads in send order.
    pub async fn send(&mut self, input: &str) -> Result<Option<TurnReport>> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        let turn_start = Instant::now();

        let user = ChatMessage::user(input);
        self.append(user.clone(), false).await?;

        let capture_start = Instant::now();
        let outcome = self.capture.capture(&self.source).await;
        let capture_ms = capture_start.elapsed().as_millis() as u64;
        self.publish_capture(&outcome).await?;

        let detect_start = Instant::now();
        let emotion = self.resolve_emotion(&outcome).await;
        let detect_ms = detect_start.elapsed().as_millis() as u64;
        self.publish(SystemEvent::new(
            EventKind::Emotion,
            EventPayload::Emotion(EmotionEvent {
                label: emotion.label.clone(),
                confidence: emotion.confidence,
                fallback: emotion.fallback,
            }),
        ))
        .await?;

        let chat_start = Instant::now();
        let (reply, chat_failed) = match self.chat.reply(input, &emotion.label).await {
            Ok(text) => (ChatMessage::bot(text), false),
            Err(err) => {
                warn!("Chat request failed: {err}");
                (ChatMessage::bot(self.settings.fallback_message.clone()), true)
            }
        };
        let chat_ms = chat_start.elapsed().as_millis() as u64;
        self.append(reply.clone(), chat_failed).await?;

        let latency = TurnLatency {
            capture_ms,
            detect_ms,
            chat_ms,
            total_ms: turn_start.elapsed().as_millis() as u64,
            recorded_at: Utc::now(),
        };
        self.telemetry
            .record_turn(latency.clone(), emotion.fallback, chat_failed)
            .await?;
        self.publish(SystemEvent::new(
            EventKind::Telemetry,
            EventPayload::Telemetry(TelemetryEvent {
                latency: Some(latency.clone()),
                notes: None,
            }),
        ))
        .await?;

        info!(
            emotion = %emotion.label,
            capture = outcome.label(),
            chat_failed,
            total_ms = latency.total_ms,
            "Chat turn complete"
        );

        Ok(Some(TurnReport {
            user,
            reply,
            emotion,
            capture: outcome.label(),
            chat_failed,
            latency,
        }))
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.publish(SystemEvent::lifecycle(
            LifecyclePhase::SessionEnd,
            format!("{} messages exchanged", self.thread.len()),
        ))
        .await
    }

    pub fn thread(&self) -> &ChatThread {
        &self.thread
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    /// Stage one. Anything short of a labelled detection resolves to neutral.
    async fn resolve_emotion(&self, outcome: &CaptureOutcome) -> EmotionResolution {
        let Some(image) = outcome.image() else {
            return EmotionResolution::neutral();
        };
        match self.detector.detect(image).await {
            Ok(detection) => match detection.label {
                Some(label) => EmotionResolution {
                    label,
                    confidence: detection.confidence,
                    fallback: false,
                },
                None => EmotionResolution {
                    confidence: detection.confidence,
                    ..EmotionResolution::neutral()
                },
            },
            Err(err) => {
                warn!("Emotion detection failed: {err}");
                EmotionResolution::neutral()
            }
        }
    }

    async fn append(&mut self, message: ChatMessage, fallback: bool) -> Result<()> {
        self.thread.push(message.clone());
        self.publish(SystemEvent::new(
            EventKind::Chat,
            EventPayload::Chat(ChatEvent { message, fallback }),
        ))
        .await
    }

    async fn publish_capture(&self, outcome: &CaptureOutcome) -> Result<()> {
        let (width, height, encoded_bytes) = outcome
            .image()
            .map(|image| (image.width, image.height, image.len()))
            .unwrap_or_default();
        let reason = match outcome {
            CaptureOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        self.publish(SystemEvent::new(
            EventKind::Capture,
            EventPayload::Capture(CaptureEvent {
                outcome: outcome.label().to_string(),
                width,
                height,
                encoded_bytes,
                reason,
            }),
        ))
        .await
    }

    async fn publish(&self, event: SystemEvent) -> Result<()> {
        let cloned = event.clone();
        self.network.publish(event).await?;
        self.telemetry.record_event(cloned).await?;
        Ok(())
    }
}
