//! Query executor

use std::sync::Arc;

use discovery_core::{EngineSettings, DOC_TYPE};
use discovery_engine::EngineConnection;
use serde_json::Value;

use crate::error::Result;

/// Sends payloads to the engine and applies the fail-open policy
pub struct QueryExecutor {
    connection: Arc<dyn EngineConnection>,
    index_name: String,
    silently_fail: bool,
}

impl QueryExecutor {
    pub fn new(connection: Arc<dyn EngineConnection>, settings: &EngineSettings) -> Self {
        Self {
            connection,
            index_name: settings.index_name.clone(),
            silently_fail: settings.silently_fail,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Run one search.
    ///
    /// Returns `Ok(None)` when the engine failed and the executor is
    /// configured to fail silently; the failure is logged instead.
    pub async fn execute(&self, query_string: &str, payload: &Value) -> Result<Option<Value>> {
        tracing::debug!("Searching {} with {}", self.index_name, payload);

        match self
            .connection
            .search(&self.index_name, DOC_TYPE, payload)
            .await
        {
            Ok(response) => Ok(Some(response)),
            Err(e) if self.silently_fail => {
                tracing::error!(
                    "Failed to query the search engine using '{}': {}",
                    query_string,
                    e
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
