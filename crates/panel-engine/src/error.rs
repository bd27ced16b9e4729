//! Error types for the orchestration engine

use thiserror::Error;

/// Engine-specific errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error surfaced from the core taxonomy
    #[error(transparent)]
    Core(#[from] panel_core::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Convert EngineError to panel_core::Error
impl From<EngineError> for panel_core::Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(inner) => inner,
            EngineError::ConfigError(msg) => panel_core::Error::Internal(msg),
        }
    }
}
