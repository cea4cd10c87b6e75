//! Search request types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::facet::{DateFacet, FacetSpec};

/// Query string that matches every document
pub const MATCH_ALL: &str = "*:*";

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A geographic point, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One sort criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SortSpec {
    Field {
        field: String,
        #[serde(default)]
        order: SortOrder,
    },
    GeoDistance {
        field: String,
        point: GeoPoint,
        #[serde(default)]
        order: SortOrder,
    },
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    /// Parse `field` (ascending) or `-field` (descending)
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(spec),
        }
    }

    pub fn geo_distance(field: impl Into<String>, point: GeoPoint) -> Self {
        Self::GeoDistance {
            field: field.into(),
            point,
            order: SortOrder::Asc,
        }
    }

    pub fn is_geo(&self) -> bool {
        matches!(self, Self::GeoDistance { .. })
    }
}

/// A structured search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query string; empty means "no search"
    pub query: String,

    /// Sort criteria, applied in order
    #[serde(default)]
    pub sort: Vec<SortSpec>,

    /// Offset of the first hit to return
    #[serde(default)]
    pub start_offset: usize,

    /// Offset one past the last hit to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_offset: Option<usize>,

    /// Field and query facets, keyed by facet name
    #[serde(default)]
    pub facets: BTreeMap<String, FacetSpec>,

    /// Date histogram facets, keyed by field
    #[serde(default)]
    pub date_facets: BTreeMap<String, DateFacet>,

    /// Extra filter query strings, AND-ed together
    #[serde(default)]
    pub narrow_queries: Vec<String>,

    /// Restrict hits to these content types (`app_label.model_name`)
    #[serde(default)]
    pub models: Vec<String>,

    /// Count hits and facet buckets by distinct values of this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_counts_by: Option<String>,

    /// Request highlighted snippets of the content field
    #[serde(default)]
    pub highlight: bool,

    /// Point of origin for distance annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_point: Option<GeoPoint>,

    /// Alternate text for spelling suggestions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spelling_query: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Request matching every document
    pub fn match_all() -> Self {
        Self::new(MATCH_ALL)
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }

    /// Set the hit window to `[start, end)`
    pub fn with_window(mut self, start: usize, end: usize) -> Self {
        self.start_offset = start;
        self.end_offset = Some(end);
        self
    }

    pub fn with_facet(mut self, name: impl Into<String>, facet: FacetSpec) -> Self {
        self.facets.insert(name.into(), facet);
        self
    }

    /// Terms facet named after its field, like the usual faceting convention
    pub fn with_field_facet(self, field: impl Into<String>) -> Self {
        let field = field.into();
        let facet = FacetSpec::terms(field.clone());
        self.with_facet(field, facet)
    }

    pub fn with_query_facet(self, name: impl Into<String>, query: impl Into<String>) -> Self {
        self.with_facet(name, FacetSpec::query(query))
    }

    pub fn with_date_facet(mut self, field: impl Into<String>, facet: DateFacet) -> Self {
        self.date_facets.insert(field.into(), facet);
        self
    }

    pub fn with_narrow_query(mut self, query: impl Into<String>) -> Self {
        self.narrow_queries.push(query.into());
        self
    }

    pub fn with_model(mut self, content_type: impl Into<String>) -> Self {
        self.models.push(content_type.into());
        self
    }

    pub fn with_distinct_counts_by(mut self, field: impl Into<String>) -> Self {
        self.distinct_counts_by = Some(field.into());
        self
    }

    pub fn with_highlight(mut self) -> Self {
        self.highlight = true;
        self
    }

    pub fn with_distance_point(mut self, point: GeoPoint) -> Self {
        self.distance_point = Some(point);
        self
    }

    pub fn with_spelling_query(mut self, query: impl Into<String>) -> Self {
        self.spelling_query = Some(query.into());
        self
    }

    /// Number of hits requested, when the window is bounded
    pub fn page_size(&self) -> Option<usize> {
        self.end_offset
            .filter(|end| *end > self.start_offset)
            .map(|end| end - self.start_offset)
    }

    pub fn has_geo_sort(&self) -> bool {
        self.sort.iter().any(SortSpec::is_geo)
    }

    /// Distinct counting is only active for a non-empty field name
    pub fn distinct_field(&self) -> Option<&str> {
        self.distinct_counts_by
            .as_deref()
            .filter(|field| !field.is_empty())
    }
}
