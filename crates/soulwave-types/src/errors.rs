use thiserror::Error;

pub type Result<T, E = SoulwaveError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum SoulwaveError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("vision error: {0}")]
    Vision(String),
    #[error("remote service error: {0}")]
    Remote(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operational error: {0}")]
    Ops(String),
}
