use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{chat::UserProfile, Result, SoulwaveError};

/// Which video source backs frame capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Mock,
    Still,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub source: SourceKind,
    /// Image file served by the `still` source.
    #[serde(default)]
    pub still_path: Option<String>,
    /// Program and arguments of the `command` source; stdout must be a PNG or JPEG.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_mock_resolution")]
    pub mock_resolution: (u32, u32),
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisionConfig {
    /// When set, every encoded still is also written here.
    #[serde(default)]
    pub capture_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_url")]
    pub url: String,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the hosted auth platform.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the service-role key.
    #[serde(default = "default_service_key_env")]
    pub service_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_detect_upstream")]
    pub detect_upstream: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_telemetry_dir")]
    pub telemetry_dir: String,
    /// Log destination for the interactive UI; stderr otherwise.
    #[serde(default)]
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SoulwaveConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ops: OpsConfig,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

impl SoulwaveConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            SoulwaveError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            SoulwaveError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(SoulwaveError::Configuration(
                "capture.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        match self.capture.source {
            SourceKind::Mock => {
                let (w, h) = self.capture.mock_resolution;
                if w == 0 || h == 0 {
                    return Err(SoulwaveError::Configuration(
                        "capture.mock_resolution must be non-zero".into(),
                    ));
                }
            }
            SourceKind::Still => {
                if self.capture.still_path.as_deref().map_or(true, str::is_empty) {
                    return Err(SoulwaveError::Configuration(
                        "capture.still_path is required for the still source".into(),
                    ));
                }
            }
            SourceKind::Command => {
                if self.capture.command.is_empty() {
                    return Err(SoulwaveError::Configuration(
                        "capture.command is required for the command source".into(),
                    ));
                }
            }
        }
        ensure_http_url("detector.url", &self.detector.url)?;
        ensure_http_url("chat.url", &self.chat.url)?;
        ensure_http_url("gateway.detect_upstream", &self.gateway.detect_upstream)?;
        if let Some(url) = &self.identity.url {
            ensure_http_url("identity.url", url)?;
        }
        if self.chat.fallback_message.trim().is_empty() {
            return Err(SoulwaveError::Configuration(
                "chat.fallback_message must not be empty".into(),
            ));
        }
        if self.gateway.port == 0 {
            return Err(SoulwaveError::Configuration(
                "gateway.port must be a valid port (>0)".into(),
            ));
        }
        Ok(())
    }

    /// Short human-readable description for status bars.
    pub fn summary(&self) -> String {
        format!(
            "source={:?} quality={} detector={} chat={}",
            self.capture.source, self.capture.jpeg_quality, self.detector.url, self.chat.url
        )
    }
}

fn ensure_http_url(field: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(SoulwaveError::Configuration(format!(
            "{field} must be an http(s) URL, got '{url}'"
        )))
    }
}

fn default_mock_resolution() -> (u32, u32) {
    (640, 480)
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_detector_url() -> String {
    "http://localhost:8000/detect_emotion/".into()
}

fn default_chat_url() -> String {
    "http://localhost:8000/chat/".into()
}

fn default_fallback_message() -> String {
    "Oops, something went wrong.".into()
}

fn default_service_key_env() -> String {
    "SUPABASE_SERVICE_ROLE_KEY".into()
}

fn default_bind_addr() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_detect_upstream() -> String {
    "http://localhost:8000/detect_emotion".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_telemetry_dir() -> String {
    "telemetry".into()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            still_path: None,
            command: Vec::new(),
            mock_resolution: default_mock_resolution(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: default_detector_url(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            fallback_message: default_fallback_message(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key_env: default_service_key_env(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_gateway_port(),
            detect_upstream: default_detect_upstream(),
        }
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            telemetry_dir: default_telemetry_dir(),
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_soulwave_config_from_file() {
        let temp_path = std::env::temp_dir().join("soulwave-config-test.toml");
        let mut config = SoulwaveConfig::default();
        config.capture.source = SourceKind::Still;
        config.capture.still_path = Some("fixtures/face.png".into());
        config.capture.jpeg_quality = 75;
        config.gateway.port = 3100;
        config.profile = Some(UserProfile {
            id: "u1".into(),
            email: "someone@example.com".into(),
            full_name: None,
        });

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = SoulwaveConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.capture.source, SourceKind::Still);
        assert_eq!(loaded.capture.jpeg_quality, 75);
        assert_eq!(loaded.gateway.port, 3100);
        assert_eq!(
            loaded.profile.map(|p| p.email),
            Some("someone@example.com".to_string())
        );
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn bundled_dev_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/dev.toml");
        let config = SoulwaveConfig::from_file(&path).expect("load dev config");
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.source, SourceKind::Mock);
        assert_eq!(
            config.profile.map(|p| p.welcome_message().text),
            Some("Hi Dev User, how are you feeling today? 😊".to_string())
        );
    }

    #[test]
    fn partial_file_takes_defaults() {
        let config: SoulwaveConfig = toml::from_str(
            r#"
            [chat]
            url = "http://chat.internal/chat/"
            "#,
        )
        .expect("parse partial config");
        assert_eq!(config.chat.url, "http://chat.internal/chat/");
        assert_eq!(config.chat.fallback_message, "Oops, something went wrong.");
        assert_eq!(config.capture.jpeg_quality, 90);
        assert_eq!(config.detector.url, "http://localhost:8000/detect_emotion/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = SoulwaveConfig::default();
        assert!(config.validate().is_ok());

        config.capture.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.capture.jpeg_quality = 90;

        config.capture.source = SourceKind::Still;
        assert!(config.validate().is_err());
        config.capture.still_path = Some("face.png".into());
        assert!(config.validate().is_ok());

        config.capture.source = SourceKind::Command;
        assert!(config.validate().is_err());
        config.capture.command = vec!["ffmpeg".into()];
        assert!(config.validate().is_ok());

        config.detector.url = "localhost:8000".into();
        assert!(config.validate().is_err());
        config.detector.url = "http://localhost:8000/detect_emotion/".into();

        config.gateway.port = 0;
        assert!(config.validate().is_err());
        config.gateway.port = 3000;

        config.chat.fallback_message = "  ".into();
        assert!(config.validate().is_err());
    }
}
