//! Output formatting utilities

use discovery_core::SearchResult;
use discovery_search::RebuildReport;
use serde::Serialize;
use serde_json::Value;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Plain-text rendering for the table format
pub trait Tabular {
    fn to_table(&self) -> String;
}

/// Format output based on format type
pub fn format_output<T: Serialize + Tabular>(data: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => data.to_table(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Tabular for SearchResult {
    fn to_table(&self) -> String {
        let mut lines = Vec::new();

        match self.distinct_hits {
            Some(distinct) => lines.push(format!("{} hits ({} distinct)", self.hits, distinct)),
            None => lines.push(format!("{} hits", self.hits)),
        }

        for hit in &self.results {
            let title = hit.fields.get("title").map(display).unwrap_or_default();
            let mut line = format!(
                "  {:<40} {:>8.3}  {}",
                format!("{}.{}", hit.content_type(), hit.pk),
                hit.score,
                title
            );
            if let Some(km) = hit.distance_km {
                line.push_str(&format!("  ({:.1} km)", km));
            }
            lines.push(line);
            for fragment in hit.highlighted.iter().flatten() {
                lines.push(format!("      {}", fragment));
            }
        }

        if let Some(facets) = &self.facets {
            for (name, counts) in &facets.fields {
                lines.push(format!("facet {}:", name));
                for (value, count) in counts {
                    lines.push(format!("  {:<30} {}", display(value), count));
                }
            }
            for (name, counts) in &facets.dates {
                lines.push(format!("facet {}:", name));
                for (date, count) in counts {
                    lines.push(format!("  {:<30} {}", date.to_rfc3339(), count));
                }
            }
            for (name, count) in &facets.queries {
                lines.push(format!("query facet {}: {}", name, count));
            }
        }

        if let Some(suggestion) = &self.spelling_suggestion {
            lines.push(format!("Did you mean: {}", suggestion));
        }

        lines.join("\n")
    }
}

impl Tabular for RebuildReport {
    fn to_table(&self) -> String {
        let mut lines = vec![
            format!("Alias {} now points to {}", self.alias, self.index),
            format!("Records indexed: {}", self.record_count),
        ];
        if let Some(previous) = self.previous_count {
            lines.push(format!("Previous record count: {}", previous));
        }
        if !self.sanity_checked {
            lines.push("Sanity check skipped".to_string());
        }
        if !self.previous_indices.is_empty() {
            lines.push(format!(
                "Previous indices kept: {}",
                self.previous_indices.join(", ")
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_core::{FacetCounts, SearchHit};
    use serde_json::json;

    #[test]
    fn test_empty_result_json() {
        let result: SearchResult = SearchResult::empty();
        let out = format_output(&result, OutputFormat::Json);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({ "results": [], "hits": 0 }));
    }

    #[test]
    fn test_result_table() {
        let mut facets = FacetCounts::default();
        facets
            .fields
            .insert("subject".to_string(), vec![(json!("physics"), 1)]);
        let result = SearchResult {
            results: vec![SearchHit {
                app_label: "course_metadata".to_string(),
                model_name: "courserun".to_string(),
                pk: "1".to_string(),
                score: 1.0,
                highlighted: None,
                point_of_origin: None,
                distance_km: None,
                fields: json!({ "title": "Intro to Physics" }),
            }],
            hits: 2,
            distinct_hits: Some(1),
            facets: Some(facets),
            spelling_suggestion: None,
        };

        let table = format_output(&result, OutputFormat::Table);
        assert!(table.starts_with("2 hits (1 distinct)"));
        assert!(table.contains("course_metadata.courserun.1"));
        assert!(table.contains("Intro to Physics"));
        assert!(table.contains("facet subject:"));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("table"), OutputFormat::Table);
        assert_eq!(OutputFormat::from("other"), OutputFormat::Table);
    }
}
