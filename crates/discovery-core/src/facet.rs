//! Facet definitions
//!
//! Facets are parsed into typed variants at the boundary. Anything that has no
//! unambiguous aggregation equivalent is rejected with `Error::Configuration`
//! before a request can reach the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};

/// Bucket count requested for terms facets when the caller gives none
pub const DEFAULT_FACET_SIZE: u32 = 100;

const TERMS_OPTIONS: [&str; 2] = ["field", "size"];

/// A facet that can be expressed both as a legacy facet and as an aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum FacetSpec {
    /// Bucket documents by the values of `field`
    Terms { field: String, size: Option<u32> },
    /// Count documents matching a query string
    Query { query: String },
}

impl FacetSpec {
    /// Terms facet with the default bucket count
    pub fn terms(field: impl Into<String>) -> Self {
        Self::Terms {
            field: field.into(),
            size: Some(DEFAULT_FACET_SIZE),
        }
    }

    pub fn terms_with_size(field: impl Into<String>, size: u32) -> Self {
        Self::Terms {
            field: field.into(),
            size: Some(size),
        }
    }

    pub fn query(query: impl Into<String>) -> Self {
        Self::Query {
            query: query.into(),
        }
    }

    /// Parse a raw facet definition.
    ///
    /// Accepts exactly `{"terms": {"field", "size"?}}` or
    /// `{"query": {"query_string": {"query"}}}`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let config = value
            .as_object()
            .ok_or_else(|| Error::configuration("Facet config must be an object"))?;

        if config.len() != 1 {
            return Err(Error::configuration(
                "Facet config expected to have exactly 1 key",
            ));
        }

        if let Some(terms) = config.get("terms") {
            Self::parse_terms(terms)
        } else if let Some(query) = config.get("query") {
            Self::parse_query(query)
        } else {
            let kind = config.keys().next().map(String::as_str).unwrap_or_default();
            Err(Error::configuration(format!(
                "Cannot convert unsupported facet type '{}' to aggregation",
                kind
            )))
        }
    }

    fn parse_terms(terms: &Value) -> Result<Self> {
        let options = terms
            .as_object()
            .ok_or_else(|| Error::configuration("Terms facet options must be an object"))?;

        if let Some(option) = options.keys().find(|k| !TERMS_OPTIONS.contains(&k.as_str())) {
            return Err(Error::configuration(format!(
                "Cannot convert terms facet to aggregation: Unsupported option '{}'",
                option
            )));
        }

        let field = options
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::configuration("Terms facet requires a string 'field'"))?;

        let size = match options.get("size") {
            None => None,
            Some(size) => {
                let size = size
                    .as_u64()
                    .and_then(|s| u32::try_from(s).ok())
                    .ok_or_else(|| {
                        Error::configuration("Terms facet 'size' must be a non-negative integer")
                    })?;
                Some(size)
            }
        };

        Ok(Self::Terms {
            field: field.to_string(),
            size,
        })
    }

    fn parse_query(query: &Value) -> Result<Self> {
        let query_string = query
            .as_object()
            .filter(|q| q.len() == 1)
            .and_then(|q| q.get("query_string"))
            .ok_or_else(|| {
                Error::configuration("Cannot convert query facet to aggregation: Unsupported options")
            })?;

        let text = query_string
            .as_object()
            .filter(|qs| qs.len() == 1)
            .and_then(|qs| qs.get("query"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::configuration(
                    "Cannot convert query facet to aggregation: Unsupported query_string option",
                )
            })?;

        Ok(Self::query(text))
    }

    /// Legacy facet definition, as sent in the `facets` section
    pub fn to_facet(&self) -> Value {
        match self {
            Self::Terms { field, size } => {
                let mut terms = Map::new();
                terms.insert("field".to_string(), Value::String(field.clone()));
                if let Some(size) = size {
                    terms.insert("size".to_string(), json!(size));
                }
                json!({ "terms": terms })
            }
            Self::Query { query } => json!({
                "query": { "query_string": { "query": query } }
            }),
        }
    }

    /// Aggregation equivalent of the facet.
    ///
    /// Terms facets are already valid aggregations; query facets are wrapped
    /// in a `filter` aggregation.
    pub fn to_aggregation(&self) -> Value {
        match self {
            Self::Terms { .. } => self.to_facet(),
            Self::Query { .. } => json!({ "filter": self.to_facet() }),
        }
    }
}

impl TryFrom<Value> for FacetSpec {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(&value)
    }
}

impl From<FacetSpec> for Value {
    fn from(spec: FacetSpec) -> Self {
        spec.to_facet()
    }
}

/// Unit of a date histogram gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGap {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DateGap {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        }
    }
}

fn default_gap_amount() -> u32 {
    1
}

/// Date histogram facet over a bounded range.
///
/// Only available on plain faceted searches; distinct counting rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFacet {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub gap_by: DateGap,
    #[serde(default = "default_gap_amount")]
    pub gap_amount: u32,
}

impl DateFacet {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>, gap_by: DateGap) -> Self {
        Self {
            start_date,
            end_date,
            gap_by,
            gap_amount: 1,
        }
    }

    pub fn with_gap_amount(mut self, gap_amount: u32) -> Self {
        self.gap_amount = gap_amount;
        self
    }

    /// Histogram interval: `month`, `year`, `day`, or e.g. `3d` for multi-unit gaps
    pub fn interval(&self) -> String {
        let unit = self.gap_by.as_str();
        if self.gap_amount != 1 && !matches!(self.gap_by, DateGap::Month | DateGap::Year) {
            format!("{}{}", self.gap_amount, &unit[..1])
        } else {
            unit.to_string()
        }
    }

    pub fn to_facet(&self, field: &str) -> Value {
        let mut range = Map::new();
        range.insert(
            field.to_string(),
            json!({
                "from": self.start_date.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "to": self.end_date.format("%Y-%m-%dT%H:%M:%S").to_string(),
            }),
        );
        json!({
            "date_histogram": { "field": field, "interval": self.interval() },
            "facet_filter": { "range": range },
        })
    }
}
