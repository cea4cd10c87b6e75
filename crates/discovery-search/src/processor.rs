//! Result processor
//!
//! Normalizes a raw engine response into a [`SearchResult`]. When the request
//! counts distinct values, hit and facet counts are taken from the cardinality
//! aggregations instead of the raw document counts.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use discovery_core::{
    FacetCounts, QuerySettings, SearchHit, SearchRequest, SearchResult, DJANGO_CT, DJANGO_ID,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::builder::distinct_agg_name;
use crate::error::{Result, SearchError};

/// Converts engine responses into search results
#[derive(Debug, Clone)]
pub struct ResultProcessor {
    content_field: String,
    include_spelling: bool,
    indexed_models: BTreeSet<String>,
    distinct_counts: bool,
}

impl ResultProcessor {
    pub fn new(query: &QuerySettings) -> Self {
        Self {
            content_field: query.content_field.clone(),
            include_spelling: query.include_spelling,
            indexed_models: query.indexed_models.iter().cloned().collect(),
            distinct_counts: true,
        }
    }

    /// Whether `distinct_counts_by` is honored. When off, requests that set it
    /// get the raw document counts.
    pub fn with_distinct_counts(mut self, enabled: bool) -> Self {
        self.distinct_counts = enabled;
        self
    }

    pub fn process<R: DeserializeOwned>(
        &self,
        raw: &Value,
        request: &SearchRequest,
    ) -> Result<SearchResult<R>> {
        let mut hits = total_hits(raw);
        let geo_sort = request.has_geo_sort();

        let raw_hits = raw
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut results = Vec::with_capacity(raw_hits.len());
        for raw_hit in raw_hits {
            match self.hit(raw_hit, request, geo_sort)? {
                Some(hit) => results.push(hit),
                None => hits = hits.saturating_sub(1),
            }
        }

        let mut result = SearchResult {
            results,
            hits,
            distinct_hits: None,
            facets: legacy_facets(raw)?,
            spelling_suggestion: self.spelling_suggestion(raw),
        };

        if let Some(field) = request.distinct_field().filter(|_| self.distinct_counts) {
            let (distinct_hits, facets) = distinct_facets(raw, field)?;
            result.distinct_hits = Some(distinct_hits);
            result.facets = Some(facets);
        }

        Ok(result)
    }

    /// One hit, or `None` when its model is not indexed by this backend
    fn hit<R: DeserializeOwned>(
        &self,
        raw_hit: &Value,
        request: &SearchRequest,
        geo_sort: bool,
    ) -> Result<Option<SearchHit<R>>> {
        let source = raw_hit
            .get("_source")
            .and_then(Value::as_object)
            .ok_or_else(|| SearchError::malformed("hit has no '_source'"))?;

        let content_type = source
            .get(DJANGO_CT)
            .and_then(Value::as_str)
            .ok_or_else(|| SearchError::malformed(format!("hit source has no '{}'", DJANGO_CT)))?;
        let (app_label, model_name) = content_type
            .split_once('.')
            .filter(|(_, model)| !model.contains('.'))
            .ok_or_else(|| {
                SearchError::malformed(format!("invalid content type '{}'", content_type))
            })?;

        if !self.indexed_models.is_empty() && !self.indexed_models.contains(content_type) {
            tracing::warn!("Dropping hit for unindexed model {}", content_type);
            return Ok(None);
        }

        let pk = match source.get(DJANGO_ID) {
            Some(Value::String(pk)) => pk.clone(),
            Some(Value::Number(pk)) => pk.to_string(),
            _ => {
                return Err(SearchError::malformed(format!(
                    "hit source has no '{}'",
                    DJANGO_ID
                )))
            }
        };

        let mut fields: Map<String, Value> = source.clone();
        fields.remove(DJANGO_CT);
        fields.remove(DJANGO_ID);

        let highlighted = raw_hit
            .get("highlight")
            .and_then(|h| h.get(&self.content_field))
            .and_then(Value::as_array)
            .map(|fragments| {
                fragments
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            });

        let distance_km = match request.distance_point {
            Some(_) if geo_sort => raw_hit.pointer("/sort/0").and_then(Value::as_f64),
            _ => None,
        };

        Ok(Some(SearchHit {
            app_label: app_label.to_string(),
            model_name: model_name.to_string(),
            pk,
            score: raw_hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0),
            highlighted,
            point_of_origin: request.distance_point,
            distance_km,
            fields: serde_json::from_value(Value::Object(fields))?,
        }))
    }

    fn spelling_suggestion(&self, raw: &Value) -> Option<String> {
        if !self.include_spelling {
            return None;
        }

        let words = raw.pointer("/suggest/suggest")?.as_array()?;
        if words.is_empty() {
            return None;
        }

        let suggestion: Vec<&str> = words
            .iter()
            .filter_map(|word| {
                word.pointer("/options/0/text")
                    .and_then(Value::as_str)
                    .or_else(|| word.get("text").and_then(Value::as_str))
            })
            .collect();
        Some(suggestion.join(" "))
    }
}

/// `hits.total`, either a bare number or `{"value": n}`
fn total_hits(raw: &Value) -> u64 {
    match raw.pointer("/hits/total") {
        Some(Value::Object(total)) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
        Some(total) => total.as_u64().unwrap_or(0),
        None => 0,
    }
}

/// Counts from the legacy `facets` section, if the response has one
fn legacy_facets(raw: &Value) -> Result<Option<FacetCounts>> {
    let Some(raw_facets) = raw.get("facets").and_then(Value::as_object) else {
        return Ok(None);
    };

    let mut facets = FacetCounts::default();
    for (name, info) in raw_facets {
        match info.get("_type").and_then(Value::as_str).unwrap_or("terms") {
            "terms" => {
                let terms = entries(info, "terms", name)?
                    .iter()
                    .map(|entry| -> Result<(Value, u64)> {
                        let term = entry.get("term").cloned().unwrap_or(Value::Null);
                        Ok((term, count(entry, name)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                facets.fields.insert(name.clone(), terms);
            }
            "date_histogram" => {
                let dates = entries(info, "entries", name)?
                    .iter()
                    .map(|entry| -> Result<(DateTime<Utc>, u64)> {
                        Ok((bucket_time(entry, name)?, count(entry, name)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                facets.dates.insert(name.clone(), dates);
            }
            "query" => {
                facets.queries.insert(name.clone(), count(info, name)?);
            }
            other => {
                tracing::debug!("Ignoring facet {} of type {}", name, other);
            }
        }
    }

    Ok(Some(facets))
}

fn entries<'a>(info: &'a Value, key: &str, facet: &str) -> Result<&'a Vec<Value>> {
    info.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::malformed(format!("facet '{}' has no '{}'", facet, key)))
}

fn count(entry: &Value, facet: &str) -> Result<u64> {
    entry
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| SearchError::malformed(format!("facet '{}' entry has no 'count'", facet)))
}

fn bucket_time(entry: &Value, facet: &str) -> Result<DateTime<Utc>> {
    entry
        .get("time")
        .and_then(Value::as_i64)
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| SearchError::malformed(format!("facet '{}' entry has no valid 'time'", facet)))
}

/// Distinct hit count and per-facet distinct counts from the aggregations.
///
/// Every key is required: a missing one means the payload and the response
/// disagree, and zero counts would hide that.
fn distinct_facets(raw: &Value, field: &str) -> Result<(u64, FacetCounts)> {
    let agg_name = distinct_agg_name(field);
    let aggs = raw
        .get("aggregations")
        .and_then(Value::as_object)
        .ok_or_else(|| SearchError::malformed("response has no 'aggregations'"))?;

    let distinct_hits = cardinality(aggs.get(&agg_name), &agg_name)?;

    let mut facets = FacetCounts::default();
    for (name, data) in aggs {
        if *name == agg_name {
            continue;
        }

        match data.get("buckets") {
            Some(buckets) => {
                let buckets = buckets.as_array().ok_or_else(|| {
                    SearchError::malformed(format!("aggregation '{}' buckets is not a list", name))
                })?;
                let counts = buckets
                    .iter()
                    .map(|bucket| -> Result<(Value, u64)> {
                        let key = bucket.get("key").cloned().ok_or_else(|| {
                            SearchError::malformed(format!("bucket in '{}' has no 'key'", name))
                        })?;
                        Ok((key, cardinality(bucket.get(&agg_name), &agg_name)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                facets.fields.insert(name.clone(), counts);
            }
            None => {
                facets
                    .queries
                    .insert(name.clone(), cardinality(data.get(&agg_name), &agg_name)?);
            }
        }
    }

    Ok((distinct_hits, facets))
}

fn cardinality(agg: Option<&Value>, agg_name: &str) -> Result<u64> {
    agg.and_then(|agg| agg.get("value"))
        .and_then(Value::as_u64)
        .ok_or_else(|| SearchError::malformed(format!("missing '{}' value", agg_name)))
}
