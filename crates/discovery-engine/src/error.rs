//! Engine error types
//!
//! Every variant is a transport-level failure from the point of view of the
//! search backend: the engine could not be reached or refused the request.

use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Engine-specific error types
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("Bulk request failed for {failed} of {total} documents")]
    Bulk { failed: usize, total: usize },

    #[error("Unsupported request: {0}")]
    Unsupported(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
