//! Elasticsearch REST connection

use std::time::Duration;

use async_trait::async_trait;
use discovery_core::{EngineSettings, IndexDocument};
use reqwest::{header, Client, Response, StatusCode};
use serde_json::{json, Value};

use crate::error::{EngineError, EngineResult};
use crate::traits::{AliasAction, EngineConnection};

/// Connection to an Elasticsearch cluster over HTTP
#[derive(Debug, Clone)]
pub struct HttpConnection {
    client: Client,
    base_url: String,
}

impl HttpConnection {
    pub fn new(url: &str, timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &EngineSettings) -> EngineResult<Self> {
        Self::new(&settings.url, Duration::from_secs(settings.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Turn non-success statuses into `EngineError::Status`
    async fn check(response: Response) -> EngineResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn bulk_body(documents: &[IndexDocument]) -> EngineResult<String> {
        let mut body = String::new();
        for document in documents {
            let action = json!({ "index": { "_id": document.id() } });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&document.to_source())?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl EngineConnection for HttpConnection {
    async fn health_check(&self) -> EngineResult<bool> {
        let response = self.client.get(self.url("_cluster/health")).send().await?;
        let health: Value = Self::check(response).await?.json().await?;
        Ok(health.get("status").and_then(Value::as_str) != Some("red"))
    }

    async fn search(&self, index: &str, doc_type: &str, body: &Value) -> EngineResult<Value> {
        let url = self.url(&format!("{}/{}/_search?_source=true", index, doc_type));
        tracing::debug!("POST {}", url);

        let response = self.client.post(url).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn count(&self, index: &str) -> EngineResult<u64> {
        let response = self
            .client
            .get(self.url(&format!("{}/_count", index)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(EngineError::IndexNotFound(index.to_string()));
        }

        let body: Value = Self::check(response).await?.json().await?;
        body.get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::InvalidResponse("count response has no 'count'".into()))
    }

    async fn create_index(&self, index: &str, body: &Value) -> EngineResult<()> {
        tracing::info!("Creating index {}", index);

        let response = self.client.put(self.url(index)).json(body).send().await?;
        if response.status() == StatusCode::BAD_REQUEST {
            let text = response.text().await.unwrap_or_default();
            if text.contains("already_exists") || text.contains("AlreadyExists") {
                return Err(EngineError::IndexExists(index.to_string()));
            }
            return Err(EngineError::Status {
                status: StatusCode::BAD_REQUEST.as_u16(),
                body: text,
            });
        }

        Self::check(response).await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> EngineResult<()> {
        let response = self.client.delete(self.url(index)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(EngineError::IndexNotFound(index.to_string()));
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> EngineResult<bool> {
        let response = self.client.head(self.url(index)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => Self::check(response).await.map(|_| true),
        }
    }

    async fn refresh(&self, index: &str) -> EngineResult<()> {
        let response = self
            .client
            .post(self.url(&format!("{}/_refresh", index)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn bulk_index(
        &self,
        index: &str,
        doc_type: &str,
        documents: &[IndexDocument],
    ) -> EngineResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.url(&format!("{}/{}/_bulk", index, doc_type)))
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(Self::bulk_body(documents)?)
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;

        if body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            let failed = body
                .get("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter(|item| item.pointer("/index/error").is_some())
                        .count()
                })
                .unwrap_or(documents.len());
            return Err(EngineError::Bulk {
                failed,
                total: documents.len(),
            });
        }

        tracing::debug!("Indexed {} documents into {}", documents.len(), index);
        Ok(())
    }

    async fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> EngineResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("{}/{}/{}", index, doc_type, id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn alias_targets(&self, alias: &str) -> EngineResult<Vec<String>> {
        let response = self
            .client
            .get(self.url(&format!("_alias/{}", alias)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let body: Value = Self::check(response).await?.json().await?;
        let indices = body
            .as_object()
            .ok_or_else(|| EngineError::InvalidResponse("alias response is not an object".into()))?;
        Ok(indices.keys().cloned().collect())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> EngineResult<()> {
        let body = json!({ "actions": actions });
        tracing::debug!("Updating aliases: {}", body);

        let response = self
            .client
            .post(self.url("_aliases"))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
