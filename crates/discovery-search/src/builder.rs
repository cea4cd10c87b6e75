//! Query builder
//!
//! Turns a [`SearchRequest`] into the JSON body sent to the engine. The base
//! payload is the standard faceted query; optional behaviors are applied on
//! top of it as an ordered list of [`PayloadTransform`]s chosen from the
//! backend's [`Features`].

use discovery_core::{
    FacetSpec, Features, FunctionScore, QuerySettings, SearchRequest, SortSpec, DJANGO_CT,
    MATCH_ALL,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, SearchError};

/// Name of the cardinality aggregation counting distinct values of `field`
pub fn distinct_agg_name(field: &str) -> String {
    format!("distinct_{}", field)
}

/// Engine request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub query: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggs: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggest: Option<Value>,

    pub from: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl QueryPayload {
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A rewrite applied to the base payload
pub trait PayloadTransform: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn apply(&self, request: &SearchRequest, payload: &mut QueryPayload) -> Result<()>;
}

/// Replaces the analyzer-heavy `query_string` query with a function-score
/// query around a plain `query_string`
#[derive(Debug, Clone)]
pub struct SimpleQuery {
    function_score: FunctionScore,
}

impl SimpleQuery {
    pub fn new(function_score: FunctionScore) -> Self {
        Self { function_score }
    }

    fn function_score_query(&self, query: &str) -> Value {
        let mut body = self.function_score.to_json();
        body.insert(
            "query".to_string(),
            json!({
                "query_string": {
                    "query": query,
                    "analyze_wildcard": true,
                    "auto_generate_phrase_queries": true,
                }
            }),
        );
        json!({ "function_score": body })
    }
}

impl PayloadTransform for SimpleQuery {
    fn name(&self) -> &'static str {
        "simple_query"
    }

    fn apply(&self, request: &SearchRequest, payload: &mut QueryPayload) -> Result<()> {
        let replacement = self.function_score_query(&request.query);

        if let Some(filtered) = payload
            .query
            .get_mut("filtered")
            .and_then(Value::as_object_mut)
            .filter(|filtered| filtered.get("query").is_some_and(|q| !q.is_null()))
        {
            filtered.insert("query".to_string(), replacement);
        } else if payload.query.get("query_string").is_some() {
            payload.query = replacement;
        }

        Ok(())
    }
}

/// Adds cardinality aggregations so hits and facets count distinct values of
/// the request's distinct-by field
#[derive(Debug, Clone, Default)]
pub struct DistinctCounts;

impl PayloadTransform for DistinctCounts {
    fn name(&self) -> &'static str {
        "distinct_counts"
    }

    fn apply(&self, request: &SearchRequest, payload: &mut QueryPayload) -> Result<()> {
        let Some(field) = request.distinct_field() else {
            return Ok(());
        };

        let agg_name = distinct_agg_name(field);
        let cardinality = json!({ "cardinality": { "field": field } });

        let mut aggregations = Map::new();
        aggregations.insert(agg_name.clone(), cardinality.clone());

        for (name, config) in payload.facets.take().unwrap_or_default() {
            let mut aggregation = FacetSpec::from_json(&config)?.to_aggregation();
            let Some(object) = aggregation.as_object_mut() else {
                return Err(SearchError::configuration(format!(
                    "Aggregation for facet '{}' is not an object",
                    name
                )));
            };

            let mut nested = Map::new();
            nested.insert(agg_name.clone(), cardinality.clone());
            object.insert("aggs".to_string(), Value::Object(nested));

            aggregations.insert(name, aggregation);
        }

        payload.aggs = Some(aggregations);
        Ok(())
    }
}

/// Builds engine payloads for one backend configuration
pub struct QueryBuilder {
    query: QuerySettings,
    transforms: Vec<Box<dyn PayloadTransform>>,
}

impl QueryBuilder {
    /// Builder with no optional transforms
    pub fn new(query: QuerySettings) -> Self {
        Self {
            query,
            transforms: Vec::new(),
        }
    }

    /// Builder with the transforms enabled in `features`, in their fixed
    /// order: simple query first, then distinct counts
    pub fn with_features(
        query: QuerySettings,
        features: &Features,
        function_score: &FunctionScore,
    ) -> Self {
        let mut builder = Self::new(query);
        if features.simple_query {
            builder = builder.with_transform(SimpleQuery::new(function_score.clone()));
        }
        if features.distinct_counts {
            builder = builder.with_transform(DistinctCounts);
        }
        builder
    }

    pub fn with_transform(mut self, transform: impl PayloadTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Names of the active transforms, in application order
    pub fn transforms(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn build(&self, request: &SearchRequest) -> Result<QueryPayload> {
        let mut payload = self.base_payload(request);

        for transform in &self.transforms {
            transform.apply(request, &mut payload)?;
            tracing::trace!("Applied {} transform", transform.name());
        }

        tracing::debug!("Built query payload for '{}'", request.query);
        Ok(payload)
    }

    /// The standard faceted query, before any transform
    pub fn base_payload(&self, request: &SearchRequest) -> QueryPayload {
        let mut query = if request.query == MATCH_ALL {
            json!({ "match_all": {} })
        } else {
            json!({
                "query_string": {
                    "default_field": self.query.content_field,
                    "default_operator": self.query.default_operator,
                    "query": request.query,
                    "analyze_wildcard": true,
                    "auto_generate_phrase_queries": true,
                    "fuzzy_min_sim": self.query.fuzzy_min_sim,
                    "fuzzy_max_expansions": self.query.fuzzy_max_expansions,
                }
            })
        };

        let sort = request.sort.iter().map(sort_clause).collect();

        let highlight = request.highlight.then(|| {
            let mut fields = Map::new();
            fields.insert(self.query.content_field.clone(), json!({ "store": "yes" }));
            json!({ "fields": fields })
        });

        let suggest = self.query.include_spelling.then(|| {
            let text = request.spelling_query.as_deref().unwrap_or(&request.query);
            json!({ "suggest": { "text": text, "term": { "field": "_all" } } })
        });

        let mut facets = Map::new();
        for (name, facet) in &request.facets {
            facets.insert(name.clone(), facet.to_facet());
        }
        for (field, facet) in &request.date_facets {
            facets.insert(field.clone(), facet.to_facet(field));
        }

        let mut narrow_queries = request.narrow_queries.clone();
        if !request.models.is_empty() {
            narrow_queries.push(format!("{}:({})", DJANGO_CT, request.models.join(" OR ")));
        }
        let mut filters: Vec<Value> = narrow_queries
            .iter()
            .map(|q| json!({ "fquery": { "query": { "query_string": { "query": q } }, "_cache": true } }))
            .collect();

        if !filters.is_empty() {
            let filter = if filters.len() == 1 {
                filters.remove(0)
            } else {
                json!({ "bool": { "must": filters } })
            };
            query = json!({ "filtered": { "query": query, "filter": filter } });
        }

        QueryPayload {
            query,
            facets: (!facets.is_empty()).then_some(facets),
            aggs: None,
            sort,
            highlight,
            suggest,
            from: request.start_offset,
            size: request.page_size(),
        }
    }
}

fn sort_clause(spec: &SortSpec) -> Value {
    match spec {
        SortSpec::Field { field, order } => {
            let mut clause = Map::new();
            clause.insert(field.clone(), json!({ "order": order.as_str() }));
            Value::Object(clause)
        }
        SortSpec::GeoDistance {
            field,
            point,
            order,
        } => {
            let mut distance = Map::new();
            distance.insert(field.clone(), json!([point.lon, point.lat]));
            distance.insert("order".to_string(), json!(order.as_str()));
            distance.insert("unit".to_string(), json!("km"));
            json!({ "_geo_distance": distance })
        }
    }
}
