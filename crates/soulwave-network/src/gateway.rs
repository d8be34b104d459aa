//! HTTP gateway exposing the user-existence check and the detection proxy.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use soulwave_remote::{DetectProxy, UserDirectory};
use soulwave_types::{config::GatewayConfig, Result};
use thiserror::Error;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::network_error;

#[derive(Debug, Deserialize)]
pub struct CheckUserRequest {
    /// Anything other than a string never matches a registered user.
    #[serde(default, deserialize_with = "string_or_none")]
    pub email: Option<String>,
}

fn string_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Errors surfaced by gateway routes.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The identity platform could not produce a user list.
    #[error("Failed to fetch users: {0}")]
    UserList(String),

    /// Any failure on the detection pass-through.
    #[error("Error detecting emotion: {0}")]
    Detect(String),

    /// The request body was not the expected JSON.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            GatewayError::UserList(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "Failed to fetch users", "error": detail }),
            ),
            GatewayError::Detect(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Error detecting emotion" }),
            ),
            GatewayError::InvalidBody(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "Invalid request body", "error": detail }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Shared handles for gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// `None` when no identity platform is configured; check-user then answers 500.
    pub directory: Option<Arc<dyn UserDirectory>>,
    pub proxy: Arc<dyn DetectProxy>,
}

pub fn router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/check_user", post(check_user))
        .route("/api/detect_emotion", post(detect_emotion))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: &GatewayConfig, state: GatewayState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port)
        .parse()
        .map_err(|e| network_error(format!("invalid gateway address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| network_error(format!("failed to bind {addr}: {e}")))?;

    info!("Gateway listening on http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| network_error(format!("gateway server error: {e}")))?;
    info!("Gateway shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gateway"),
        _ = terminate => info!("Received SIGTERM, shutting down gateway"),
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// 400 if the email is already registered, 200 if not or if no email string was sent,
/// 500 if the body is not JSON or the user list is unavailable.
pub async fn check_user(
    State(state): State<GatewayState>,
    body: Bytes,
) -> std::result::Result<Response, GatewayError> {
    let request: CheckUserRequest =
        serde_json::from_slice(&body).map_err(|e| GatewayError::InvalidBody(e.to_string()))?;

    let directory = state
        .directory
        .as_ref()
        .ok_or_else(|| GatewayError::UserList("identity platform not configured".into()))?;
    let lookup = match request.email.as_deref() {
        Some(email) => directory.email_exists(email).await,
        None => directory.list_users().await.map(|_| false),
    };
    let exists = lookup.map_err(|e| {
        warn!("User list lookup failed: {e}");
        GatewayError::UserList(e.to_string())
    })?;

    let (status, message) = if exists {
        (StatusCode::BAD_REQUEST, "User already exists")
    } else {
        (StatusCode::OK, "User does not exist")
    };
    Ok((
        status,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response())
}

/// Forward the JSON body to the detection service and relay its JSON reply.
pub async fn detect_emotion(
    State(state): State<GatewayState>,
    body: Bytes,
) -> std::result::Result<Json<serde_json::Value>, GatewayError> {
    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| GatewayError::Detect(e.to_string()))?;
    let reply = state.proxy.forward(payload).await.map_err(|e| {
        warn!("Detect proxy failed: {e}");
        GatewayError::Detect(e.to_string())
    })?;
    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use soulwave_remote::{remote_error, DirectoryUser};

    struct StaticDirectory {
        users: Option<Vec<&'static str>>,
    }

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn list_users(&self) -> soulwave_types::Result<Vec<DirectoryUser>> {
            let users = self
                .users
                .as_ref()
                .ok_or_else(|| remote_error("upstream down"))?;
            Ok(users
                .iter()
                .enumerate()
                .map(|(i, email)| DirectoryUser {
                    id: i.to_string(),
                    email: Some(email.to_string()),
                })
                .collect())
        }
    }

    struct EchoProxy {
        fail: bool,
    }

    #[async_trait]
    impl DetectProxy for EchoProxy {
        async fn forward(
            &self,
            body: serde_json::Value,
        ) -> soulwave_types::Result<serde_json::Value> {
            if self.fail {
                return Err(remote_error("connection refused"));
            }
            Ok(json!({ "echo": body, "detected_emotion": "happy" }))
        }
    }

    fn state(users: Option<Vec<&'static str>>, proxy_fails: bool) -> GatewayState {
        GatewayState {
            directory: Some(Arc::new(StaticDirectory { users })),
            proxy: Arc::new(EchoProxy { fail: proxy_fails }),
        }
    }

    async fn into_parts(response: Response) -> (StatusCode, serde_json::Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn existing_email_is_rejected() {
        let response = check_user(
            State(state(Some(vec!["ada@example.com"]), false)),
            Bytes::from_static(br#"{"email":"ada@example.com"}"#),
        )
        .await
        .into_response();
        let (status, body) = into_parts(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User already exists");
    }

    #[tokio::test]
    async fn absent_email_is_ok() {
        let response = check_user(
            State(state(Some(vec!["ada@example.com"]), false)),
            Bytes::from_static(br#"{"email":"bob@example.com"}"#),
        )
        .await
        .into_response();
        let (status, body) = into_parts(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User does not exist");
    }

    #[tokio::test]
    async fn upstream_failure_is_500() {
        let response = check_user(
            State(state(None, false)),
            Bytes::from_static(br#"{"email":"ada@example.com"}"#),
        )
        .await
        .into_response();
        let (status, body) = into_parts(response).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to fetch users");
    }

    #[tokio::test]
    async fn unconfigured_directory_is_500() {
        let gateway = GatewayState {
            directory: None,
            proxy: Arc::new(EchoProxy { fail: false }),
        };
        let response = check_user(
            State(gateway),
            Bytes::from_static(br#"{"email":"ada@example.com"}"#),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unparseable_check_user_body_is_500() {
        let response = check_user(
            State(state(Some(vec!["ada@example.com"]), false)),
            Bytes::from_static(b"{not json"),
        )
        .await
        .into_response();
        let (status, body) = into_parts(response).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_ne!(body["message"], "User already exists");
    }

    #[tokio::test]
    async fn missing_or_non_string_email_does_not_exist() {
        let bodies: [&[u8]; 3] = [b"{}", br#"{"email":null}"#, br#"{"email":42}"#];
        for raw in bodies {
            let response = check_user(
                State(state(Some(vec!["ada@example.com"]), false)),
                Bytes::copy_from_slice(raw),
            )
            .await
            .into_response();
            let (status, body) = into_parts(response).await;
            assert_eq!(status, StatusCode::OK, "body {:?}", String::from_utf8_lossy(raw));
            assert_eq!(body["message"], "User does not exist");
        }
    }

    #[tokio::test]
    async fn missing_email_still_reports_upstream_failure() {
        let response = check_user(State(state(None, false)), Bytes::from_static(b"{}"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn detect_proxy_relays_upstream_json() {
        let response = detect_emotion(
            State(state(Some(vec![]), false)),
            Bytes::from_static(br#"{"image":"abc"}"#),
        )
        .await
        .into_response();
        let (status, body) = into_parts(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["echo"]["image"], "abc");
        assert_eq!(body["detected_emotion"], "happy");
    }

    #[tokio::test]
    async fn detect_proxy_failure_is_generic_500() {
        let response = detect_emotion(
            State(state(Some(vec![]), true)),
            Bytes::from_static(br#"{"image":"abc"}"#),
        )
        .await
        .into_response();
        let (status, body) = into_parts(response).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Error detecting emotion" }));
    }

    #[tokio::test]
    async fn detect_proxy_rejects_non_json_with_500() {
        let response = detect_emotion(
            State(state(Some(vec![]), false)),
            Bytes::from_static(b"plain text"),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn health_reports_version() {
        let Json(health) = health_check().await;
        assert_eq!(health.status, "healthy");
        assert!(!health.version.is_empty());
    }
}
