//! Query, sort and aggregation evaluation for the in-memory engine
//!
//! Covers the subset of the query DSL the search backend emits: `match_all`,
//! `query_string`, `function_score`, `filtered`, `bool`, `term` and `range`,
//! plus `terms`, `filter` and `cardinality` aggregations and legacy `terms`
//! and `query` facets.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::error::{EngineError, EngineResult};

const EARTH_RADIUS_KM: f64 = 6371.0;
const DEFAULT_TERMS_SIZE: usize = 10;

fn single_key(value: &Value) -> EngineResult<(&str, &Value)> {
    let object = value
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| EngineError::Unsupported(format!("expected a single-key clause: {}", value)))?;
    let (key, inner) = object
        .iter()
        .next()
        .ok_or_else(|| EngineError::Unsupported("empty clause".into()))?;
    Ok((key.as_str(), inner))
}

/// Whether `doc` matches a query clause
pub(crate) fn query_matches(query: &Value, doc: &Value) -> EngineResult<bool> {
    let (kind, body) = single_key(query)?;
    match kind {
        "match_all" => Ok(true),
        "query_string" => {
            let text = body
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| EngineError::Unsupported("query_string without query".into()))?;
            Ok(query_string_matches(text, doc))
        }
        "function_score" => match body.get("query") {
            Some(inner) => query_matches(inner, doc),
            None => Ok(true),
        },
        "filtered" => {
            let query_ok = match body.get("query") {
                Some(inner) => query_matches(inner, doc)?,
                None => true,
            };
            let filter_ok = match body.get("filter") {
                Some(filter) => filter_matches(filter, doc)?,
                None => true,
            };
            Ok(query_ok && filter_ok)
        }
        "bool" => bool_matches(body, doc, query_matches),
        "term" => term_matches(body, doc),
        other => Err(EngineError::Unsupported(format!("query type '{}'", other))),
    }
}

/// Whether `doc` passes a filter clause
pub(crate) fn filter_matches(filter: &Value, doc: &Value) -> EngineResult<bool> {
    let (kind, body) = single_key(filter)?;
    match kind {
        "match_all" => Ok(true),
        "fquery" | "query" => {
            let inner = body.get("query").unwrap_or(body);
            query_matches(inner, doc)
        }
        "bool" => bool_matches(body, doc, filter_matches),
        "term" => term_matches(body, doc),
        "range" => range_matches(body, doc),
        other => Err(EngineError::Unsupported(format!("filter type '{}'", other))),
    }
}

fn bool_matches(
    body: &Value,
    doc: &Value,
    eval: fn(&Value, &Value) -> EngineResult<bool>,
) -> EngineResult<bool> {
    let clauses = |key: &str| -> Vec<Value> {
        match body.get(key) {
            Some(Value::Array(items)) => items.clone(),
            Some(single) => vec![single.clone()],
            None => Vec::new(),
        }
    };

    for clause in clauses("must") {
        if !eval(&clause, doc)? {
            return Ok(false);
        }
    }
    for clause in clauses("must_not") {
        if eval(&clause, doc)? {
            return Ok(false);
        }
    }
    let should = clauses("should");
    if !should.is_empty() {
        for clause in &should {
            if eval(clause, doc)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }
    Ok(true)
}

fn term_matches(body: &Value, doc: &Value) -> EngineResult<bool> {
    let (field, expected) = single_key(body)?;
    let expected = scalar_text(expected);
    Ok(field_values(doc, field)
        .iter()
        .any(|v| scalar_text(v).eq_ignore_ascii_case(&expected)))
}

fn range_matches(body: &Value, doc: &Value) -> EngineResult<bool> {
    let (field, bounds) = single_key(body)?;
    let values = field_values(doc, field);
    let lower = bounds.get("from").or_else(|| bounds.get("gte"));
    let upper = bounds.get("to").or_else(|| bounds.get("lte"));

    Ok(values.iter().any(|value| {
        let above = lower.map_or(true, |l| l.is_null() || compare(value, l) != Ordering::Less);
        let below = upper.map_or(true, |u| u.is_null() || compare(value, u) != Ordering::Greater);
        above && below
    }))
}

/// Whitespace-separated clauses, AND-ed. `field:value` and `field:(a OR b)`
/// match field values; bare terms match any text in the document.
fn query_string_matches(query: &str, doc: &Value) -> bool {
    let query = query.trim();
    if query.is_empty() || query == "*:*" {
        return true;
    }
    tokenize(query)
        .iter()
        .filter(|token| !matches!(token.as_str(), "AND" | "OR"))
        .all(|token| clause_matches(token, doc))
}

fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;

    for c in query.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            '(' if !quoted => {
                depth += 1;
                current.push(c);
            }
            ')' if !quoted => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn clause_matches(token: &str, doc: &Value) -> bool {
    match token.split_once(':') {
        Some((field, value)) if !field.is_empty() => {
            let value = value.trim_start_matches('(').trim_end_matches(')');
            let values = field_values(doc, field);
            value
                .split(" OR ")
                .map(|alt| alt.trim().trim_matches('"'))
                .any(|alt| {
                    values
                        .iter()
                        .any(|v| scalar_text(v).eq_ignore_ascii_case(alt))
                })
        }
        _ => {
            let term = token.trim_matches('"').trim_end_matches('*').to_lowercase();
            term.is_empty() || contains_text(doc, &term)
        }
    }
}

fn contains_text(value: &Value, term: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(term),
        Value::Array(items) => items.iter().any(|v| contains_text(v, term)),
        Value::Object(map) => map.values().any(|v| contains_text(v, term)),
        _ => false,
    }
}

/// Values of a field, with arrays flattened
pub(crate) fn field_values<'a>(doc: &'a Value, field: &str) -> Vec<&'a Value> {
    match doc.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
        Some(value) => vec![value],
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => scalar_text(a).cmp(&scalar_text(b)),
    }
}

fn parse_point(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Object(map) => Some((map.get("lat")?.as_f64()?, map.get("lon")?.as_f64()?)),
        Value::String(s) => {
            let (lat, lon) = s.split_once(',')?;
            Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
        }
        // [lon, lat], as in geo_distance sort origins
        Value::Array(items) if items.len() == 2 => Some((items[1].as_f64()?, items[0].as_f64()?)),
        _ => None,
    }
}

fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let h = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// A sort key: either a plain field or a distance from an origin
pub(crate) enum SortKey {
    Field { field: String, descending: bool },
    Distance { field: String, origin: (f64, f64), descending: bool },
}

impl SortKey {
    pub(crate) fn parse(spec: &Value) -> EngineResult<Self> {
        let (key, body) = single_key(spec)?;
        let descending = body.get("order").and_then(Value::as_str) == Some("desc");

        if key == "_geo_distance" {
            let (field, origin) = body
                .as_object()
                .and_then(|o| o.iter().find(|(k, _)| !matches!(k.as_str(), "order" | "unit")))
                .ok_or_else(|| EngineError::Unsupported("geo distance sort without field".into()))?;
            let origin = parse_point(origin)
                .ok_or_else(|| EngineError::Unsupported("geo distance origin".into()))?;
            return Ok(Self::Distance {
                field: field.clone(),
                origin,
                descending,
            });
        }

        Ok(Self::Field {
            field: key.to_string(),
            descending,
        })
    }

    /// Sort value for a document; `None` sorts last
    pub(crate) fn value(&self, doc: &Value) -> Option<Value> {
        match self {
            Self::Field { field, .. } => field_values(doc, field).first().map(|v| (*v).clone()),
            Self::Distance { field, origin, .. } => field_values(doc, field)
                .first()
                .and_then(|v| parse_point(v))
                .map(|point| json!(haversine_km(*origin, point))),
        }
    }

    pub(crate) fn cmp(&self, a: &Option<Value>, b: &Option<Value>) -> Ordering {
        let descending = match self {
            Self::Field { descending, .. } | Self::Distance { descending, .. } => *descending,
        };
        match (a, b) {
            (Some(x), Some(y)) => {
                let ord = compare(x, y);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// Group documents by field value, most frequent first
fn group_by<'a>(docs: &[&'a Value], field: &str) -> Vec<(Value, Vec<&'a Value>)> {
    let mut groups: BTreeMap<String, (Value, Vec<&'a Value>)> = BTreeMap::new();
    for doc in docs {
        let mut seen = BTreeSet::new();
        for value in field_values(doc, field) {
            let key = scalar_text(value);
            if !seen.insert(key.clone()) {
                continue;
            }
            groups
                .entry(key)
                .or_insert_with(|| (value.clone(), Vec::new()))
                .1
                .push(*doc);
        }
    }

    let mut groups: Vec<(Value, Vec<&Value>)> = groups.into_values().collect();
    groups.sort_by(|a, b| {
        b.1.len()
            .cmp(&a.1.len())
            .then_with(|| scalar_text(&a.0).cmp(&scalar_text(&b.0)))
    });
    groups
}

fn distinct_count(docs: &[&Value], field: &str) -> usize {
    docs.iter()
        .flat_map(|doc| field_values(doc, field))
        .map(scalar_text)
        .collect::<BTreeSet<_>>()
        .len()
}

fn required_field<'a>(body: &'a Value, kind: &str) -> EngineResult<&'a str> {
    body.get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::Unsupported(format!("{} without field", kind)))
}

/// Evaluate an `aggs` section over the matched documents
pub(crate) fn aggregate(aggs: &Map<String, Value>, docs: &[&Value]) -> EngineResult<Map<String, Value>> {
    let mut results = Map::new();

    for (name, definition) in aggs {
        let object = definition
            .as_object()
            .ok_or_else(|| EngineError::Unsupported(format!("aggregation '{}'", name)))?;
        let sub_aggs = object
            .get("aggs")
            .or_else(|| object.get("aggregations"))
            .and_then(Value::as_object);
        let (kind, body) = object
            .iter()
            .find(|(k, _)| !matches!(k.as_str(), "aggs" | "aggregations"))
            .ok_or_else(|| EngineError::Unsupported(format!("aggregation '{}' has no type", name)))?;

        let result = match kind.as_str() {
            "cardinality" => {
                let field = required_field(body, "cardinality")?;
                json!({ "value": distinct_count(docs, field) })
            }
            "terms" => {
                let field = required_field(body, "terms")?;
                let size = body
                    .get("size")
                    .and_then(Value::as_u64)
                    .map_or(DEFAULT_TERMS_SIZE, |s| s as usize);

                let mut buckets = Vec::new();
                for (key, bucket_docs) in group_by(docs, field).into_iter().take(size) {
                    let mut bucket = Map::new();
                    bucket.insert("key".to_string(), key);
                    bucket.insert("doc_count".to_string(), json!(bucket_docs.len()));
                    if let Some(sub) = sub_aggs {
                        bucket.extend(aggregate(sub, &bucket_docs)?);
                    }
                    buckets.push(Value::Object(bucket));
                }
                json!({ "buckets": buckets })
            }
            "filter" => {
                let mut matched = Vec::new();
                for doc in docs {
                    if filter_matches(body, doc)? {
                        matched.push(*doc);
                    }
                }
                let mut result = Map::new();
                result.insert("doc_count".to_string(), json!(matched.len()));
                if let Some(sub) = sub_aggs {
                    result.extend(aggregate(sub, &matched)?);
                }
                Value::Object(result)
            }
            other => {
                return Err(EngineError::Unsupported(format!("aggregation type '{}'", other)))
            }
        };

        results.insert(name.clone(), result);
    }

    Ok(results)
}

/// Evaluate a legacy `facets` section over the matched documents
pub(crate) fn facet(facets: &Map<String, Value>, docs: &[&Value]) -> EngineResult<Map<String, Value>> {
    let mut results = Map::new();

    for (name, definition) in facets {
        let (kind, body) = single_key(definition)?;
        let result = match kind {
            "terms" => {
                let field = required_field(body, "terms facet")?;
                let size = body
                    .get("size")
                    .and_then(Value::as_u64)
                    .map_or(DEFAULT_TERMS_SIZE, |s| s as usize);
                let terms: Vec<Value> = group_by(docs, field)
                    .into_iter()
                    .take(size)
                    .map(|(term, docs)| json!({ "term": term, "count": docs.len() }))
                    .collect();
                json!({ "_type": "terms", "terms": terms })
            }
            "query" => {
                let mut count = 0;
                for doc in docs {
                    if query_matches(body, doc)? {
                        count += 1;
                    }
                }
                json!({ "_type": "query", "count": count })
            }
            other => return Err(EngineError::Unsupported(format!("facet type '{}'", other))),
        };
        results.insert(name.clone(), result);
    }

    Ok(results)
}
