//! Discovery Core - Types shared by the search backend
//!
//! This crate provides the request and result value types, facet
//! definitions, indexed documents and backend settings used by the
//! Discovery search backend.

pub mod document;
pub mod error;
pub mod facet;
pub mod request;
pub mod result;
pub mod settings;

pub use document::{IndexDocument, DJANGO_CT, DJANGO_ID, DOC_TYPE, ID};
pub use error::{Error, Result};
pub use facet::{DateFacet, DateGap, FacetSpec, DEFAULT_FACET_SIZE};
pub use request::{GeoPoint, SearchRequest, SortOrder, SortSpec, MATCH_ALL};
pub use result::{FacetCounts, SearchHit, SearchResult};
pub use settings::{
    AnalyzerOverride, AnalyzerSettings, BoostSettings, EngineSettings, Features, FieldDefinition,
    FieldKind, FunctionScore, IndexSettings, QuerySettings, SchemaSettings, Settings,
};
