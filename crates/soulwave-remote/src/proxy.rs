use async_trait::async_trait;
use soulwave_types::Result;

use crate::{remote_error, DetectProxy};

/// Posts a JSON body to the detection service and returns whatever JSON it answers with,
/// regardless of status code.
#[derive(Clone)]
pub struct HttpDetectProxy {
    client: reqwest::Client,
    upstream: String,
}

impl HttpDetectProxy {
    pub fn new(client: reqwest::Client, upstream: impl Into<String>) -> Self {
        Self {
            client,
            upstream: upstream.into(),
        }
    }
}

#[async_trait]
impl DetectProxy for HttpDetectProxy {
    async fn forward(&self, body: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(&self.upstream)
            .json(&body)
            .send()
            .await
            .map_err(|e| remote_error(format!("failed to reach detect upstream: {e}")))?;
        let status = response.status();
        let value = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| remote_error(format!("detect upstream sent non-JSON body: {e}")))?;
        tracing::debug!(status = status.as_u16(), "Detect upstream answered");
        Ok(value)
    }
}
