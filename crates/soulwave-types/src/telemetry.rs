use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock breakdown of one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnLatency {
    pub capture_ms: u64,
    pub detect_ms: u64,
    pub chat_ms: u64,
    pub total_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Running counters kept by a video source.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceMetrics {
    pub frames_read: u64,
    pub failed_reads: u64,
    pub last_read_ms: Option<u64>,
}

/// Aggregated history for a chat session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionTelemetry {
    pub turns: Vec<TurnLatency>,
    pub neutral_fallbacks: u64,
    pub chat_failures: u64,
}

impl SessionTelemetry {
    pub fn mean_total_ms(&self) -> Option<u64> {
        if self.turns.is_empty() {
            return None;
        }
        let sum: u64 = self.turns.iter().map(|t| t.total_ms).sum();
        Some(sum / self.turns.len() as u64)
    }
}
