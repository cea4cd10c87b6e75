//! Search error types

use discovery_engine::EngineError;
use thiserror::Error;

/// Result type alias for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Search-specific error types
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Core(#[from] discovery_core::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] EngineError),

    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("{summary}")]
    SanityCheck {
        alias: String,
        index: String,
        previous: u64,
        current: u64,
        change: f64,
        summary: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Caller or configuration bug, never worth retrying
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Core(discovery_core::Error::Configuration(_))
        )
    }
}
