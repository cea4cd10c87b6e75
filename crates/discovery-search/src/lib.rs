//! Discovery Search - Faceted search over an Elasticsearch-style engine
//!
//! Provides the query builder (with simple-query and distinct-count
//! transforms), the fail-open query executor, the result processor, index
//! schema generation and the non-clearing rebuild lifecycle.

pub mod backend;
pub mod builder;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod processor;
pub mod schema;

pub use backend::SearchBackend;
pub use builder::{distinct_agg_name, DistinctCounts, PayloadTransform, QueryBuilder, QueryPayload, SimpleQuery};
pub use error::{Result, SearchError};
pub use executor::QueryExecutor;
pub use lifecycle::{
    percentage_change, timestamped_index_name, DocumentSource, IndexRebuilder, RebuildReport,
    SanityCheck, StaticSource,
};
pub use processor::ResultProcessor;
pub use schema::Schema;
