use async_trait::async_trait;
use serde::Deserialize;
use soulwave_types::Result;

use crate::{ensure_success, remote_error, DirectoryUser, UserDirectory};

const ADMIN_USERS_PATH: &str = "/auth/v1/admin/users";

#[derive(Debug, Deserialize)]
struct ListUsersResponse {
    #[serde(default)]
    users: Vec<DirectoryUser>,
}

/// Lists accounts through the hosted auth platform's admin API.
#[derive(Clone)]
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl HttpUserDirectory {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>> {
        if self.service_key.is_empty() {
            return Err(remote_error("identity service key is empty"));
        }
        let url = format!("{}{}", self.base_url, ADMIN_USERS_PATH);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| remote_error(format!("failed to reach identity platform: {e}")))?;
        let response = ensure_success("identity platform", response).await?;

        let parsed: ListUsersResponse = response
            .json()
            .await
            .map_err(|e| remote_error(format!("failed to parse user list: {e}")))?;
        tracing::debug!(count = parsed.users.len(), "Fetched user list");
        Ok(parsed.users)
    }
}
