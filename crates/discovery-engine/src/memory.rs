//! In-memory engine for tests and dry runs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use discovery_core::IndexDocument;
use serde_json::{json, Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::matching::{aggregate, facet, query_matches, SortKey};
use crate::traits::{AliasAction, EngineConnection};

const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Clone, Default)]
struct MemoryIndex {
    body: Value,
    documents: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct EngineState {
    indices: BTreeMap<String, MemoryIndex>,
    aliases: BTreeMap<String, BTreeSet<String>>,
}

impl EngineState {
    /// Physical indices behind a name, which may be an index or an alias
    fn resolve(&self, name: &str) -> EngineResult<Vec<String>> {
        if self.indices.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        match self.aliases.get(name) {
            Some(targets) if !targets.is_empty() => Ok(targets.iter().cloned().collect()),
            _ => Err(EngineError::IndexNotFound(name.to_string())),
        }
    }
}

/// In-memory engine
///
/// Holds indices, documents and aliases in process and evaluates the query
/// subset the search backend produces. Every search body is recorded so tests
/// can assert on what was (or was not) sent.
pub struct MemoryEngine {
    state: RwLock<EngineState>,
    available: AtomicBool,
    searches: Mutex<Vec<Value>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
            available: AtomicBool::new(true),
            searches: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the engine going down or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Search bodies received so far, oldest first
    pub fn searches(&self) -> Vec<Value> {
        self.searches
            .lock()
            .map(|searches| searches.clone())
            .unwrap_or_default()
    }

    /// Settings and mappings an index was created with
    pub fn index_body(&self, index: &str) -> Option<Value> {
        let state = self.state.read().ok()?;
        state.indices.get(index).map(|i| i.body.clone())
    }

    /// Names of all physical indices
    pub fn indices(&self) -> Vec<String> {
        self.state
            .read()
            .map(|state| state.indices.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure_available(&self) -> EngineResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Unavailable("connection refused".into()))
        }
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, EngineState>> {
        self.state
            .read()
            .map_err(|e| EngineError::Internal(format!("Lock error: {}", e)))
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, EngineState>> {
        self.state
            .write()
            .map_err(|e| EngineError::Internal(format!("Lock error: {}", e)))
    }

    fn record(&self, body: &Value) {
        if let Ok(mut searches) = self.searches.lock() {
            searches.push(body.clone());
        }
    }

    fn run_search(state: &EngineState, index: &str, doc_type: &str, body: &Value) -> EngineResult<Value> {
        let match_all = json!({ "match_all": {} });
        let query = body.get("query").unwrap_or(&match_all);

        let mut matched: Vec<(&str, &str, &Value)> = Vec::new();
        for name in state.resolve(index)? {
            if let Some((index_name, memory_index)) = state.indices.get_key_value(&name) {
                for (id, source) in &memory_index.documents {
                    if query_matches(query, source)? {
                        matched.push((index_name.as_str(), id.as_str(), source));
                    }
                }
            }
        }

        let sort_keys = match body.get("sort").and_then(Value::as_array) {
            Some(specs) => specs.iter().map(SortKey::parse).collect::<EngineResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        let mut keyed: Vec<(Vec<Option<Value>>, (&str, &str, &Value))> = matched
            .iter()
            .map(|hit| (sort_keys.iter().map(|k| k.value(hit.2)).collect(), *hit))
            .collect();
        keyed.sort_by(|a, b| {
            sort_keys
                .iter()
                .enumerate()
                .map(|(i, key)| key.cmp(&a.0[i], &b.0[i]))
                .find(|ord| ord.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_SIZE, |s| s as usize);
        let highlight_fields: Vec<String> = body
            .pointer("/highlight/fields")
            .and_then(Value::as_object)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();

        let hits: Vec<Value> = keyed
            .iter()
            .skip(from)
            .take(size)
            .map(|(sort_values, (index_name, id, source))| {
                let mut hit = json!({
                    "_index": index_name,
                    "_type": doc_type,
                    "_id": id,
                    "_score": 1.0,
                    "_source": source,
                });
                if !sort_keys.is_empty() {
                    hit["sort"] = Value::Array(
                        sort_values.iter().map(|v| v.clone().unwrap_or(Value::Null)).collect(),
                    );
                }
                let highlight: Map<String, Value> = highlight_fields
                    .iter()
                    .filter_map(|field| {
                        source
                            .get(field)
                            .and_then(Value::as_str)
                            .map(|text| (field.clone(), json!([text])))
                    })
                    .collect();
                if !highlight.is_empty() {
                    hit["highlight"] = Value::Object(highlight);
                }
                hit
            })
            .collect();

        let docs: Vec<&Value> = matched.iter().map(|(_, _, source)| *source).collect();
        let max_score = if matched.is_empty() {
            Value::Null
        } else {
            json!(1.0)
        };
        let mut response = json!({
            "took": 0,
            "timed_out": false,
            "hits": {
                "total": matched.len(),
                "max_score": max_score,
                "hits": hits,
            }
        });
        if let Some(aggs) = body.get("aggs").and_then(Value::as_object) {
            response["aggregations"] = Value::Object(aggregate(aggs, &docs)?);
        }
        if let Some(facets) = body.get("facets").and_then(Value::as_object) {
            response["facets"] = Value::Object(facet(facets, &docs)?);
        }
        Ok(response)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineConnection for MemoryEngine {
    async fn health_check(&self) -> EngineResult<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn search(&self, index: &str, doc_type: &str, body: &Value) -> EngineResult<Value> {
        self.ensure_available()?;
        self.record(body);
        let state = self.read()?;
        Self::run_search(&state, index, doc_type, body)
    }

    async fn count(&self, index: &str) -> EngineResult<u64> {
        self.ensure_available()?;
        let state = self.read()?;
        let total = state
            .resolve(index)?
            .iter()
            .filter_map(|name| state.indices.get(name))
            .map(|i| i.documents.len() as u64)
            .sum();
        Ok(total)
    }

    async fn create_index(&self, index: &str, body: &Value) -> EngineResult<()> {
        self.ensure_available()?;
        let mut state = self.write()?;
        if state.indices.contains_key(index) || state.aliases.contains_key(index) {
            return Err(EngineError::IndexExists(index.to_string()));
        }
        state.indices.insert(
            index.to_string(),
            MemoryIndex {
                body: body.clone(),
                documents: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> EngineResult<()> {
        self.ensure_available()?;
        let mut state = self.write()?;
        if state.indices.remove(index).is_none() {
            return Err(EngineError::IndexNotFound(index.to_string()));
        }
        for targets in state.aliases.values_mut() {
            targets.remove(index);
        }
        state.aliases.retain(|_, targets| !targets.is_empty());
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> EngineResult<bool> {
        self.ensure_available()?;
        let state = self.read()?;
        Ok(state.resolve(index).is_ok())
    }

    async fn refresh(&self, index: &str) -> EngineResult<()> {
        self.ensure_available()?;
        self.read()?.resolve(index).map(|_| ())
    }

    async fn bulk_index(
        &self,
        index: &str,
        _doc_type: &str,
        documents: &[IndexDocument],
    ) -> EngineResult<()> {
        self.ensure_available()?;
        let mut state = self.write()?;
        let name = match state.resolve(index)?.as_slice() {
            [single] => single.clone(),
            _ => {
                return Err(EngineError::Unsupported(format!(
                    "alias '{}' points to more than one index",
                    index
                )))
            }
        };
        let target = state
            .indices
            .get_mut(&name)
            .ok_or_else(|| EngineError::IndexNotFound(index.to_string()))?;
        for document in documents {
            target.documents.insert(document.id(), document.to_source());
        }
        Ok(())
    }

    async fn delete_document(&self, index: &str, _doc_type: &str, id: &str) -> EngineResult<()> {
        self.ensure_available()?;
        let mut state = self.write()?;
        for name in state.resolve(index)? {
            if let Some(target) = state.indices.get_mut(&name) {
                target.documents.remove(id);
            }
        }
        Ok(())
    }

    async fn alias_targets(&self, alias: &str) -> EngineResult<Vec<String>> {
        self.ensure_available()?;
        let state = self.read()?;
        Ok(state
            .aliases
            .get(alias)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> EngineResult<()> {
        self.ensure_available()?;
        let mut state = self.write()?;

        // Validate everything first so the update is all-or-nothing
        for action in actions {
            if let AliasAction::Add { index, .. } = action {
                if !state.indices.contains_key(index) {
                    return Err(EngineError::IndexNotFound(index.clone()));
                }
            }
        }

        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    state
                        .aliases
                        .entry(alias.clone())
                        .or_default()
                        .insert(index.clone());
                }
                AliasAction::Remove { index, alias } => {
                    if let Some(targets) = state.aliases.get_mut(alias) {
                        targets.remove(index);
                    }
                }
            }
        }
        state.aliases.retain(|_, targets| !targets.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(title: &str, subject: &str, course_id: &str, pk: &str) -> IndexDocument {
        IndexDocument::new("course_metadata.courserun", pk)
            .with_field("title", title)
            .with_field("subject", subject)
            .with_field("course_id", course_id)
    }

    async fn seeded(engine: &MemoryEngine) {
        engine.create_index("catalog_1", &json!({})).await.unwrap();
        engine
            .bulk_index(
                "catalog_1",
                "modelresult",
                &[
                    run("Intro to Physics", "physics", "A", "1"),
                    run("Intro to Physics (2017)", "physics", "A", "2"),
                    run("Organic Chemistry", "chemistry", "B", "3"),
                ],
            )
            .await
            .unwrap();
        engine
            .update_aliases(&[AliasAction::add("catalog_1", "catalog")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_through_alias() {
        let engine = MemoryEngine::new();
        seeded(&engine).await;

        let response = engine
            .search(
                "catalog",
                "modelresult",
                &json!({ "query": { "query_string": { "query": "intro" } }, "from": 0 }),
            )
            .await
            .unwrap();

        assert_eq!(response["hits"]["total"], 2);
        assert_eq!(response["hits"]["hits"][0]["_index"], "catalog_1");
        assert_eq!(response["hits"]["hits"][0]["_source"]["django_id"], "1");
        assert_eq!(engine.searches().len(), 1);
    }

    #[tokio::test]
    async fn test_search_paging_and_sort() {
        let engine = MemoryEngine::new();
        seeded(&engine).await;

        let response = engine
            .search(
                "catalog",
                "modelresult",
                &json!({
                    "query": { "match_all": {} },
                    "sort": [{ "title": { "order": "desc" } }],
                    "from": 1,
                    "size": 1,
                }),
            )
            .await
            .unwrap();

        assert_eq!(response["hits"]["total"], 3);
        let hits = response["hits"]["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["_source"]["title"], "Intro to Physics (2017)");
    }

    #[tokio::test]
    async fn test_count_and_aliases() {
        let engine = MemoryEngine::new();
        seeded(&engine).await;

        assert_eq!(engine.count("catalog").await.unwrap(), 3);
        assert_eq!(engine.alias_targets("catalog").await.unwrap(), vec!["catalog_1"]);
        assert!(engine.alias_targets("missing").await.unwrap().is_empty());

        engine.create_index("catalog_2", &json!({})).await.unwrap();
        engine
            .update_aliases(&[
                AliasAction::add("catalog_2", "catalog"),
                AliasAction::remove("catalog_1", "catalog"),
            ])
            .await
            .unwrap();

        assert_eq!(engine.alias_targets("catalog").await.unwrap(), vec!["catalog_2"]);
        assert_eq!(engine.count("catalog").await.unwrap(), 0);
        assert_eq!(engine.indices(), vec!["catalog_1", "catalog_2"]);
    }

    #[tokio::test]
    async fn test_alias_update_is_all_or_nothing() {
        let engine = MemoryEngine::new();
        seeded(&engine).await;

        let result = engine
            .update_aliases(&[
                AliasAction::remove("catalog_1", "catalog"),
                AliasAction::add("does_not_exist", "catalog"),
            ])
            .await;

        assert!(matches!(result, Err(EngineError::IndexNotFound(_))));
        assert_eq!(engine.alias_targets("catalog").await.unwrap(), vec!["catalog_1"]);
    }

    #[tokio::test]
    async fn test_create_existing_index_fails() {
        let engine = MemoryEngine::new();
        seeded(&engine).await;

        let result = engine.create_index("catalog_1", &json!({})).await;
        assert!(matches!(result, Err(EngineError::IndexExists(_))));
    }

    #[tokio::test]
    async fn test_unavailable_engine() {
        let engine = MemoryEngine::new();
        seeded(&engine).await;
        engine.set_available(false);

        let result = engine.search("catalog", "modelresult", &json!({})).await;
        assert!(matches!(result, Err(EngineError::Unavailable(_))));
        assert!(!engine.health_check().await.unwrap());
        assert!(engine.searches().is_empty());
    }

    #[tokio::test]
    async fn test_delete_document() {
        let engine = MemoryEngine::new();
        seeded(&engine).await;

        engine
            .delete_document("catalog", "modelresult", "course_metadata.courserun.3")
            .await
            .unwrap();
        assert_eq!(engine.count("catalog").await.unwrap(), 2);
    }
}
