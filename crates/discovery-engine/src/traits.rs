//! Engine connection trait definitions

use async_trait::async_trait;
use discovery_core::IndexDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineResult;

/// One step of an atomic alias update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

impl AliasAction {
    pub fn add(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Add {
            index: index.into(),
            alias: alias.into(),
        }
    }

    pub fn remove(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Remove {
            index: index.into(),
            alias: alias.into(),
        }
    }
}

/// A shared, reusable connection to a search engine.
///
/// Implementations must be safe to use from many request handlers at once;
/// callers never serialize access.
#[async_trait]
pub trait EngineConnection: Send + Sync {
    /// Whether the engine is reachable and serving requests
    async fn health_check(&self) -> EngineResult<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a search body against an index or alias and return the raw response
    async fn search(&self, index: &str, doc_type: &str, body: &Value) -> EngineResult<Value>;

    /// Number of documents in an index or behind an alias
    async fn count(&self, index: &str) -> EngineResult<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Index Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a physical index with the given settings and mappings
    async fn create_index(&self, index: &str, body: &Value) -> EngineResult<()>;

    async fn delete_index(&self, index: &str) -> EngineResult<()>;

    async fn index_exists(&self, index: &str) -> EngineResult<bool>;

    /// Make recent writes visible to searches and counts
    async fn refresh(&self, index: &str) -> EngineResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Document Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Index (create or replace) a batch of documents
    async fn bulk_index(
        &self,
        index: &str,
        doc_type: &str,
        documents: &[IndexDocument],
    ) -> EngineResult<()>;

    /// Delete one document; a missing document is not an error
    async fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> EngineResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Alias Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Physical indices an alias points to; empty when the alias does not exist
    async fn alias_targets(&self, alias: &str) -> EngineResult<Vec<String>>;

    /// Apply all actions as one atomic update
    async fn update_aliases(&self, actions: &[AliasAction]) -> EngineResult<()>;
}
