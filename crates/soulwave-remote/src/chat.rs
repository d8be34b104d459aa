use async_trait::async_trait;
use soulwave_types::{chat::EmotionLabel, Result};

use crate::{ensure_success, remote_error, ChatBackend, ChatRequest, ChatResponse};

/// JSON client for the response-generation service.
#[derive(Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpChatBackend {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn reply(&self, user_input: &str, emotion: &EmotionLabel) -> Result<String> {
        let request = ChatRequest {
            user_input: user_input.to_string(),
            emotion: emotion.as_str().to_string(),
        };

        tracing::debug!(
            url = %self.url,
            emotion = %emotion,
            input_len = user_input.len(),
            "Requesting chat reply"
        );

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| remote_error(format!("failed to reach chat backend: {e}")))?;
        let response = ensure_success("chat backend", response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| remote_error(format!("failed to parse chat response: {e}")))?;
        Ok(parsed.bot_response)
    }
}
