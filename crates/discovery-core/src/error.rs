//! Error types for Discovery Core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using Discovery's core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// A facet or option was supplied that has no engine equivalent.
    /// Always a caller bug; never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to read settings from {path}: {source}")]
    ReadSettings {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings from {path}: {source}")]
    ParseSettings {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
