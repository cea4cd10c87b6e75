//! Normalized search results

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::GeoPoint;

/// Facet counts, partitioned by facet kind.
///
/// Within one result the counts are either all raw document counts or all
/// distinct counts, never a mix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetCounts {
    /// Field facets: ordered `(bucket value, count)` pairs
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<(Value, u64)>>,

    /// Date histogram facets: `(bucket start, count)` pairs
    #[serde(default)]
    pub dates: BTreeMap<String, Vec<(DateTime<Utc>, u64)>>,

    /// Query facets: one count each
    #[serde(default)]
    pub queries: BTreeMap<String, u64>,
}

impl FacetCounts {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.dates.is_empty() && self.queries.is_empty()
    }

    /// Counts for a field facet, if present
    pub fn field(&self, name: &str) -> Option<&[(Value, u64)]> {
        self.fields.get(name).map(Vec::as_slice)
    }
}

/// One matched document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit<R = Value> {
    pub app_label: String,
    pub model_name: String,
    pub pk: String,
    pub score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_of_origin: Option<GeoPoint>,

    /// Distance from the point of origin, only known for geo-sorted searches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,

    /// Remaining stored fields, decoded into the caller's type
    pub fields: R,
}

impl<R> SearchHit<R> {
    /// `app_label.model_name`
    pub fn content_type(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }
}

/// Result of one search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<R = Value> {
    pub results: Vec<SearchHit<R>>,

    /// Total number of matching documents
    pub hits: u64,

    /// Number of distinct values of the distinct-by field among matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_hits: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetCounts>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spelling_suggestion: Option<String>,
}

impl<R> SearchResult<R> {
    /// The `{results: [], hits: 0}` shape
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            hits: 0,
            distinct_hits: None,
            facets: None,
            spelling_suggestion: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.hits == 0
    }
}

impl<R> Default for SearchResult<R> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_result_shape() {
        let result: SearchResult = SearchResult::empty();
        assert!(result.is_empty());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "results": [], "hits": 0 })
        );
    }

    #[test]
    fn test_facet_lookup() {
        let mut facets = FacetCounts::default();
        assert!(facets.is_empty());

        facets
            .fields
            .insert("subject".to_string(), vec![(json!("physics"), 1)]);
        assert_eq!(facets.field("subject"), Some(&[(json!("physics"), 1)][..]));
        assert_eq!(facets.field("org"), None);
    }
}
