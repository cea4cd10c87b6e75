//! Search backend
//!
//! Ties the query builder, executor and result processor to one engine
//! connection and one [`Settings`] value.

use std::sync::Arc;

use discovery_core::{IndexDocument, SearchRequest, SearchResult, Settings, DOC_TYPE};
use discovery_engine::EngineConnection;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::builder::{QueryBuilder, QueryPayload};
use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::lifecycle::IndexRebuilder;
use crate::processor::ResultProcessor;
use crate::schema::{self, Schema};

pub struct SearchBackend {
    connection: Arc<dyn EngineConnection>,
    settings: Settings,
    builder: QueryBuilder,
    executor: QueryExecutor,
    processor: ResultProcessor,
}

impl SearchBackend {
    pub fn new(connection: Arc<dyn EngineConnection>, settings: Settings) -> Self {
        let builder = QueryBuilder::with_features(
            settings.query.clone(),
            &settings.features,
            &settings.boost.function_score,
        );
        let executor = QueryExecutor::new(connection.clone(), &settings.engine);
        let processor = ResultProcessor::new(&settings.query)
            .with_distinct_counts(settings.features.distinct_counts);

        Self {
            connection,
            settings,
            builder,
            executor,
            processor,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index_name(&self) -> &str {
        &self.settings.engine.index_name
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Payload a request would send, without sending it
    pub fn build_payload(&self, request: &SearchRequest) -> Result<QueryPayload> {
        self.builder.build(request)
    }

    /// Run a search.
    ///
    /// An empty query string returns the empty result without contacting the
    /// engine. When the engine fails and the backend fails silently, the
    /// result is empty as well.
    pub async fn search<R: DeserializeOwned>(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResult<R>> {
        if request.query.is_empty() {
            return Ok(SearchResult::empty());
        }

        let payload = self.builder.build(request)?.to_json()?;
        match self.executor.execute(&request.query, &payload).await? {
            Some(raw) => self.processor.process(&raw, request),
            None => Ok(SearchResult::empty()),
        }
    }

    /// Index or reindex documents through the alias
    pub async fn update(&self, documents: &[IndexDocument]) -> Result<()> {
        let batch_size = self.settings.index.batch_size.max(1);
        for batch in documents.chunks(batch_size) {
            let indexed = self
                .connection
                .bulk_index(self.index_name(), DOC_TYPE, batch)
                .await;
            match indexed {
                Ok(()) => {}
                Err(e) if self.settings.engine.silently_fail => {
                    tracing::error!("Failed to add documents to {}: {}", self.index_name(), e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Remove one document by its `app_label.model_name.pk` id
    pub async fn remove(&self, id: &str) -> Result<()> {
        let removed = self
            .connection
            .delete_document(self.index_name(), DOC_TYPE, id)
            .await;
        match removed {
            Ok(()) => Ok(()),
            Err(e) if self.settings.engine.silently_fail => {
                tracing::error!("Failed to remove document '{}': {}", id, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the index.
    ///
    /// With non-clearing rebuilds enabled this only logs; indices have to be
    /// removed by hand. Otherwise every index behind the alias is deleted.
    pub async fn clear(&self) -> Result<()> {
        if self.settings.features.non_clearing {
            tracing::info!(
                "SearchBackend does NOT clear indexes. Indexes should be manually cleared \
                 using the APIs/tools appropriate for this search service."
            );
            return Ok(());
        }

        let mut targets = self.connection.alias_targets(self.index_name()).await?;
        if targets.is_empty() && self.connection.index_exists(self.index_name()).await? {
            targets.push(self.index_name().to_string());
        }
        for index in targets {
            tracing::info!("Deleting index {}", index);
            self.connection.delete_index(&index).await?;
        }
        Ok(())
    }

    /// Field mappings with analyzer configuration applied
    pub fn build_schema(&self) -> Result<Schema> {
        Schema::build(&self.settings.schema, &self.settings.analyzers)
    }

    /// Settings and mappings used to create new indices
    pub fn index_body(&self) -> Result<Value> {
        schema::index_body(&self.settings)
    }

    pub fn rebuilder(&self) -> IndexRebuilder {
        IndexRebuilder::new(self.connection.clone(), self.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_engine::MemoryEngine;
    use serde_json::json;

    async fn backend(settings: Settings) -> (Arc<MemoryEngine>, SearchBackend) {
        let engine = Arc::new(MemoryEngine::new());
        engine.create_index("catalog_1", &json!({})).await.unwrap();
        engine
            .update_aliases(&[discovery_engine::AliasAction::add("catalog_1", "catalog")])
            .await
            .unwrap();
        let backend = SearchBackend::new(engine.clone(), settings);
        (engine, backend)
    }

    #[tokio::test]
    async fn test_empty_query_never_contacts_engine() {
        let (engine, backend) = backend(Settings::default()).await;

        let request = SearchRequest::new("").with_distinct_counts_by("course_id");
        let result: SearchResult = backend.search(&request).await.unwrap();

        assert_eq!(result, SearchResult::empty());
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({ "results": [], "hits": 0 }));
        assert!(engine.searches().is_empty());
    }

    #[tokio::test]
    async fn test_fail_open_skips_distinct_processing() {
        let (engine, backend) = backend(Settings::default()).await;
        engine.set_available(false);

        let request = SearchRequest::new("intro").with_distinct_counts_by("course_id");
        let result: SearchResult = backend.search(&request).await.unwrap();
        assert_eq!(result, SearchResult::empty());
    }

    #[tokio::test]
    async fn test_distinct_counts_disabled_returns_raw_counts() {
        let mut settings = Settings::default();
        settings.features.distinct_counts = false;
        let (engine, backend) = backend(settings).await;
        backend
            .update(&[
                IndexDocument::new("course_metadata.courserun", "1")
                    .with_field("text", "Intro to Physics")
                    .with_field("course_id", "MITx+8.01x")
                    .with_field("subject", "physics"),
                IndexDocument::new("course_metadata.courserun", "2")
                    .with_field("text", "Intro to Physics (Spring)")
                    .with_field("course_id", "MITx+8.01x")
                    .with_field("subject", "physics"),
            ])
            .await
            .unwrap();

        let request = SearchRequest::new("intro")
            .with_facet("subject", discovery_core::FacetSpec::terms("subject"))
            .with_distinct_counts_by("course_id");
        let result: SearchResult = backend.search(&request).await.unwrap();

        assert!(engine.searches()[0].get("aggs").is_none());
        assert_eq!(result.hits, 2);
        assert!(result.distinct_hits.is_none());
        assert_eq!(result.facets.unwrap().fields["subject"], vec![(json!("physics"), 2)]);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let (engine, backend) = backend(Settings::default()).await;
        let doc = IndexDocument::new("course_metadata.course", "1").with_field("title", "Intro");

        backend.update(&[doc.clone()]).await.unwrap();
        assert_eq!(engine.count("catalog").await.unwrap(), 1);

        backend.remove(&doc.id()).await.unwrap();
        assert_eq!(engine.count("catalog").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_clearing_clear_keeps_index() {
        let (engine, backend) = backend(Settings::default()).await;
        backend.clear().await.unwrap();
        assert_eq!(engine.indices(), vec!["catalog_1".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_deletes_aliased_indices() {
        let mut settings = Settings::default();
        settings.features.non_clearing = false;
        let (engine, backend) = backend(settings).await;

        backend.clear().await.unwrap();
        assert!(engine.indices().is_empty());
    }
}
