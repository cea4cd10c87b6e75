//! Index lifecycle
//!
//! Rebuilds never touch the live index. A new timestamped index is built next
//! to it, checked against the previous record count, and only then does the
//! alias move. Old indices are left in place for rollback.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use discovery_core::{IndexDocument, Settings, DOC_TYPE};
use discovery_engine::{AliasAction, EngineConnection};
use serde::Serialize;

use crate::error::{Result, SearchError};
use crate::schema::index_body;

/// Supplies the documents for a rebuild
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn documents(&self) -> Result<Vec<IndexDocument>>;
}

/// A fixed set of documents
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: Vec<IndexDocument>,
}

impl StaticSource {
    pub fn new(documents: Vec<IndexDocument>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn documents(&self) -> Result<Vec<IndexDocument>> {
        Ok(self.documents.clone())
    }
}

/// `<alias>_<YYYYMMDD>_<HHMMSS>`
pub fn timestamped_index_name(alias: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", alias, now.format("%Y%m%d_%H%M%S"))
}

/// Relative change between two record counts.
///
/// A previous count of zero yields 0.0 when nothing changed and 1.0 otherwise.
pub fn percentage_change(previous: u64, current: u64) -> f64 {
    if previous == 0 {
        return if current == 0 { 0.0 } else { 1.0 };
    }
    current.abs_diff(previous) as f64 / previous as f64
}

/// Record-count comparison between the old and new index. A change equal to
/// the threshold still passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SanityCheck {
    threshold: f64,
}

impl SanityCheck {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn passes(&self, previous: u64, current: u64) -> bool {
        percentage_change(previous, current) <= self.threshold
    }

    pub fn check(&self, alias: &str, index: &str, previous: u64, current: u64) -> Result<()> {
        let change = percentage_change(previous, current);
        if change <= self.threshold {
            return Ok(());
        }

        let summary = format!(
            "Sanity check failed for new index [{}]: record count changed by {:.2}% (threshold {:.2}%). \
             Previous record count: {}, new record count: {}",
            index,
            change * 100.0,
            self.threshold * 100.0,
            previous,
            current
        );
        Err(SearchError::SanityCheck {
            alias: alias.to_string(),
            index: index.to_string(),
            previous,
            current,
            change,
            summary,
        })
    }
}

/// Outcome of a successful rebuild
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    pub alias: String,
    pub index: String,
    /// Record count behind the alias before the rebuild, if it existed
    pub previous_count: Option<u64>,
    pub record_count: u64,
    /// Indices the alias pointed to before the swap; left in place
    pub previous_indices: Vec<String>,
    pub sanity_checked: bool,
}

/// Builds a new index and repoints the alias to it
pub struct IndexRebuilder {
    connection: Arc<dyn EngineConnection>,
    settings: Settings,
    sanity_check_disabled: bool,
}

impl IndexRebuilder {
    pub fn new(connection: Arc<dyn EngineConnection>, settings: Settings) -> Self {
        Self {
            connection,
            settings,
            sanity_check_disabled: false,
        }
    }

    pub fn with_sanity_check_disabled(mut self, disabled: bool) -> Self {
        self.sanity_check_disabled = disabled;
        self
    }

    pub fn alias(&self) -> &str {
        &self.settings.engine.index_name
    }

    pub async fn rebuild(&self, source: &dyn DocumentSource) -> Result<RebuildReport> {
        self.rebuild_at(source, Utc::now()).await
    }

    /// Rebuild with an explicit timestamp for the new index name
    pub async fn rebuild_at(
        &self,
        source: &dyn DocumentSource,
        now: DateTime<Utc>,
    ) -> Result<RebuildReport> {
        let alias = self.alias().to_string();
        let index = timestamped_index_name(&alias, now);

        // Read before anything changes so the comparison is against the live index
        let previous_indices = self.connection.alias_targets(&alias).await?;
        let previous_count = if previous_indices.is_empty() {
            None
        } else {
            Some(self.connection.count(&alias).await?)
        };

        tracing::info!("Creating index {} for alias {}", index, alias);
        self.connection
            .create_index(&index, &index_body(&self.settings)?)
            .await?;

        let documents = source.documents().await?;
        let batch_size = self.settings.index.batch_size.max(1);
        for (n, batch) in documents.chunks(batch_size).enumerate() {
            self.connection.bulk_index(&index, DOC_TYPE, batch).await?;
            tracing::debug!("Indexed batch {} ({} documents)", n + 1, batch.len());
        }
        self.connection.refresh(&index).await?;

        let record_count = self.connection.count(&index).await?;
        tracing::info!("Indexed {} records into {}", record_count, index);

        let sanity_checked = match previous_count {
            _ if self.sanity_check_disabled => {
                tracing::warn!("Sanity check disabled for {}", index);
                false
            }
            None => {
                tracing::info!(
                    "Alias {} does not exist yet, skipping sanity check for {}",
                    alias,
                    index
                );
                false
            }
            Some(previous) => {
                SanityCheck::new(self.settings.index.size_change_threshold).check(
                    &alias,
                    &index,
                    previous,
                    record_count,
                )?;
                true
            }
        };

        self.set_alias(&alias, &index, &previous_indices).await?;

        Ok(RebuildReport {
            alias,
            index,
            previous_count,
            record_count,
            previous_indices,
            sanity_checked,
        })
    }

    /// Point `alias` at `index` and away from every previous target in one
    /// update
    async fn set_alias(&self, alias: &str, index: &str, previous: &[String]) -> Result<()> {
        let mut actions = vec![AliasAction::add(index, alias)];
        actions.extend(
            previous
                .iter()
                .filter(|old| old.as_str() != index)
                .map(|old| AliasAction::remove(old.as_str(), alias)),
        );

        self.connection.update_aliases(&actions).await?;
        tracing::info!("Alias {} now points to {}", alias, index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_index_name() {
        let now = Utc.with_ymd_and_hms(2016, 6, 21, 0, 0, 0).unwrap();
        assert_eq!(timestamped_index_name("catalog", now), "catalog_20160621_000000");

        let now = Utc.with_ymd_and_hms(2017, 11, 3, 14, 5, 9).unwrap();
        assert_eq!(timestamped_index_name("catalog", now), "catalog_20171103_140509");
    }

    #[test]
    fn test_percentage_change() {
        assert_eq!(percentage_change(100, 100), 0.0);
        assert_eq!(percentage_change(100, 90), 0.1);
        assert_eq!(percentage_change(100, 150), 0.5);
        assert_eq!(percentage_change(0, 0), 0.0);
        assert_eq!(percentage_change(0, 5), 1.0);
    }

    #[test]
    fn test_sanity_check_threshold() {
        let threshold = 0.1;
        let check = SanityCheck::new(threshold);
        let over = 100 + (threshold * 100.0) as u64 + 1;

        let err = check.check("catalog", "catalog_new", 100, over).unwrap_err();
        match err {
            SearchError::SanityCheck {
                previous, current, ..
            } => {
                assert_eq!(previous, 100);
                assert_eq!(current, over);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(check.check("catalog", "catalog_new", 100, 105).is_ok());
        assert!(check.check("catalog", "catalog_new", 100, 95).is_ok());
        assert!(check.check("catalog", "catalog_new", 100, 110).is_ok());
        assert!(check.check("catalog", "catalog_new", 100, 90).is_ok());
        assert!(check.passes(0, 0));
        assert!(!check.passes(0, 3));
    }
}
