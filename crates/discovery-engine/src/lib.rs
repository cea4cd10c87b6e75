//! Discovery Engine - Search engine connections
//!
//! This crate provides the connection seam between the search backend and
//! the engine that stores and searches documents: an HTTP connection to an
//! Elasticsearch cluster and an in-memory engine for tests.

pub mod error;
pub mod http;
mod matching;
pub mod memory;
pub mod traits;

pub use error::{EngineError, EngineResult};
pub use http::HttpConnection;
pub use memory::MemoryEngine;
pub use traits::{AliasAction, EngineConnection};
