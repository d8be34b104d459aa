//! Clients for the remote services the chat client depends on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soulwave_types::{chat::EmotionLabel, vision::EncodedImage, Result, SoulwaveError};

mod chat;
mod detector;
mod directory;
mod proxy;

pub use chat::HttpChatBackend;
pub use detector::HttpEmotionDetector;
pub use directory::HttpUserDirectory;
pub use proxy::HttpDetectProxy;

/// What the detection service reported for one still.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// `None` when the service answered without a usable label.
    pub label: Option<EmotionLabel>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectEmotionResponse {
    #[serde(default)]
    pub detected_emotion: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_input: String,
    pub emotion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub bot_response: String,
}

/// A user record from the identity platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait EmotionDetector: Send + Sync {
    async fn detect(&self, image: &EncodedImage) -> Result<Detection>;
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn reply(&self, user_input: &str, emotion: &EmotionLabel) -> Result<String>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>>;

    /// Exact, case-sensitive email match against the listed users.
    async fn email_exists(&self, email: &str) -> Result<bool> {
        let users = self.list_users().await?;
        Ok(users.iter().any(|user| user.email.as_deref() == Some(email)))
    }
}

/// Forwards a JSON detection request to the classifier and hands back its reply untouched.
#[async_trait]
pub trait DetectProxy: Send + Sync {
    async fn forward(&self, body: serde_json::Value) -> Result<serde_json::Value>;
}

#[async_trait]
impl<T: EmotionDetector + ?Sized> EmotionDetector for Arc<T> {
    async fn detect(&self, image: &EncodedImage) -> Result<Detection> {
        (**self).detect(image).await
    }
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn reply(&self, user_input: &str, emotion: &EmotionLabel) -> Result<String> {
        (**self).reply(user_input, emotion).await
    }
}

pub fn remote_error(message: impl Into<String>) -> SoulwaveError {
    SoulwaveError::Remote(message.into())
}

/// Turn a non-2xx response into an error carrying the body for the logs.
pub(crate) async fn ensure_success(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string());
    tracing::error!(
        status_code = status.as_u16(),
        error_body = %body,
        "{service} returned error status"
    );
    Err(remote_error(format!(
        "{service} returned error status {}: {}",
        status.as_u16(),
        body
    )))
}
