//! Index schema and analysis settings

use discovery_core::{
    AnalyzerSettings, FieldDefinition, FieldKind, IndexSettings, SchemaSettings, Settings,
    DJANGO_CT, DJANGO_ID, DOC_TYPE,
};
use serde_json::{json, Map, Value};

use crate::error::{Result, SearchError};

pub const NGRAM_ANALYZER: &str = "ngram_analyzer";
pub const EDGENGRAM_ANALYZER: &str = "edgengram_analyzer";
pub const SNOWBALL_ANALYZER: &str = "snowball";

/// Field mappings for one document type
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Name of the main full-text field
    pub content_field: String,
    pub mapping: Map<String, Value>,
}

impl Schema {
    /// Plain mappings for the configured fields, before analyzer changes
    pub fn from_fields(schema: &SchemaSettings) -> Self {
        let mut mapping = Map::new();
        for bookkeeping in [DJANGO_CT, DJANGO_ID] {
            mapping.insert(
                bookkeeping.to_string(),
                json!({ "type": "string", "index": "not_analyzed", "include_in_all": false }),
            );
        }

        let mut content_field = String::new();
        for field in &schema.fields {
            if field.document {
                content_field = field.name.clone();
            }
            mapping.insert(field.name.clone(), field_mapping(field));
        }

        Self {
            content_field,
            mapping,
        }
    }

    /// Mappings with synonym analysis and per-field analyzer overrides applied
    pub fn build(schema: &SchemaSettings, analyzers: &AnalyzerSettings) -> Result<Self> {
        let mut built = Self::from_fields(schema);

        let replaced: Vec<String> = built
            .mapping
            .iter()
            .filter(|(_, m)| {
                m.get("analyzer").and_then(Value::as_str) == Some(analyzers.replaced_analyzer.as_str())
            })
            .map(|(name, _)| name.clone())
            .collect();
        for field in replaced {
            built.specify_analyzers(
                &field,
                &analyzers.synonym_analyzer,
                &analyzers.synonym_analyzer,
            )?;
        }

        for rule in &analyzers.overrides {
            built.specify_analyzers(&rule.field, &rule.index_analyzer, &rule.search_analyzer)?;
        }

        Ok(built)
    }

    /// Replace a field's single analyzer with separate index and search
    /// analyzers
    pub fn specify_analyzers(
        &mut self,
        field: &str,
        index_analyzer: &str,
        search_analyzer: &str,
    ) -> Result<()> {
        let mapping = self
            .mapping
            .get_mut(field)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                SearchError::configuration(format!("Cannot set analyzers on unknown field '{}'", field))
            })?;

        if mapping.remove("analyzer").is_none() {
            return Err(SearchError::configuration(format!(
                "Field '{}' has no analyzer to replace",
                field
            )));
        }

        mapping.insert("index_analyzer".to_string(), json!(index_analyzer));
        mapping.insert("search_analyzer".to_string(), json!(search_analyzer));
        Ok(())
    }

    /// `mappings` section for the document type
    pub fn to_mappings(&self) -> Value {
        let mut mappings = Map::new();
        mappings.insert(
            DOC_TYPE.to_string(),
            json!({ "properties": self.mapping }),
        );
        Value::Object(mappings)
    }
}

fn field_mapping(field: &FieldDefinition) -> Value {
    let mut mapping = match field.kind {
        FieldKind::String => json!({ "type": "string", "analyzer": SNOWBALL_ANALYZER }),
        FieldKind::EdgeNgram => json!({ "type": "string", "analyzer": EDGENGRAM_ANALYZER }),
        FieldKind::Ngram => json!({ "type": "string", "analyzer": NGRAM_ANALYZER }),
        FieldKind::Date | FieldKind::Datetime => json!({ "type": "date" }),
        FieldKind::Boolean => json!({ "type": "boolean" }),
        FieldKind::Integer => json!({ "type": "long" }),
        FieldKind::Float => json!({ "type": "float" }),
        FieldKind::Location => json!({ "type": "geo_point" }),
    };

    if (field.boost - 1.0).abs() > f64::EPSILON {
        mapping["boost"] = json!(field.boost);
    }

    if field.faceted && mapping["type"] == "string" {
        if let Some(object) = mapping.as_object_mut() {
            object.insert("index".to_string(), json!("not_analyzed"));
            object.remove("analyzer");
        }
    }

    mapping
}

/// Analysis settings: ngram analyzers plus the synonym-aware snowball analyzer
pub fn analysis_settings(index: &IndexSettings, analyzers: &AnalyzerSettings) -> Value {
    let mut analyzer = Map::new();
    analyzer.insert(
        NGRAM_ANALYZER.to_string(),
        json!({ "type": "custom", "tokenizer": "standard", "filter": ["ngram_filter", "lowercase"] }),
    );
    analyzer.insert(
        EDGENGRAM_ANALYZER.to_string(),
        json!({ "type": "custom", "tokenizer": "standard", "filter": ["edgengram_filter", "lowercase"] }),
    );
    analyzer.insert(
        analyzers.synonym_analyzer.clone(),
        json!({ "type": "custom", "tokenizer": "standard", "filter": ["lowercase", "synonym", "snowball"] }),
    );

    json!({
        "analysis": {
            "analyzer": analyzer,
            "tokenizer": {
                "ngram_tokenizer": { "type": "nGram", "min_gram": 3, "max_gram": 15 },
                "edgengram_tokenizer": { "type": "edgeNGram", "min_gram": 2, "max_gram": 15, "side": "front" },
            },
            "filter": {
                "ngram_filter": { "type": "nGram", "min_gram": 3, "max_gram": 15 },
                "edgengram_filter": { "type": "edgeNGram", "min_gram": 2, "max_gram": 15 },
                "snowball": { "type": "snowball", "language": "English" },
                "synonym": { "type": "synonym", "ignore_case": true, "synonyms": index.synonyms },
            }
        }
    })
}

/// Full body for creating an index
pub fn index_body(settings: &Settings) -> Result<Value> {
    let schema = Schema::build(&settings.schema, &settings.analyzers)?;
    Ok(json!({
        "settings": analysis_settings(&settings.index, &settings.analyzers),
        "mappings": schema.to_mappings(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_core::AnalyzerOverride;

    #[test]
    fn test_plain_mappings() {
        let schema = Schema::from_fields(&SchemaSettings::default());

        assert_eq!(schema.content_field, "text");
        assert_eq!(
            schema.mapping["django_ct"],
            json!({ "type": "string", "index": "not_analyzed", "include_in_all": false })
        );
        assert_eq!(
            schema.mapping["title"],
            json!({ "type": "string", "analyzer": "snowball", "boost": 2.0 })
        );
        assert_eq!(
            schema.mapping["org"],
            json!({ "type": "string", "index": "not_analyzed" })
        );
        assert_eq!(schema.mapping["start"], json!({ "type": "date" }));
        assert_eq!(
            schema.mapping["title_autocomplete"],
            json!({ "type": "string", "analyzer": "ngram_analyzer" })
        );
    }

    #[test]
    fn test_synonym_analyzers_and_overrides() {
        let schema =
            Schema::build(&SchemaSettings::default(), &AnalyzerSettings::default()).unwrap();

        assert_eq!(
            schema.mapping["text"],
            json!({
                "type": "string",
                "index_analyzer": "snowball_with_synonyms",
                "search_analyzer": "snowball_with_synonyms",
            })
        );
        assert_eq!(
            schema.mapping["title_autocomplete"],
            json!({
                "type": "string",
                "index_analyzer": "ngram_analyzer",
                "search_analyzer": "snowball_with_synonyms",
            })
        );
        assert_eq!(
            schema.mapping["authoring_organizations_autocomplete"]["index_analyzer"],
            "ngram_analyzer"
        );
        assert!(schema.mapping["org"].get("index_analyzer").is_none());
    }

    #[test]
    fn test_override_unknown_field() {
        let analyzers = AnalyzerSettings {
            overrides: vec![AnalyzerOverride::new("missing", "ngram_analyzer", "snowball")],
            ..AnalyzerSettings::default()
        };
        let err = Schema::build(&SchemaSettings::default(), &analyzers).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_override_field_without_analyzer() {
        let analyzers = AnalyzerSettings {
            overrides: vec![AnalyzerOverride::new("org", "ngram_analyzer", "snowball")],
            ..AnalyzerSettings::default()
        };
        let err = Schema::build(&SchemaSettings::default(), &analyzers).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_index_body() {
        let mut settings = Settings::default();
        settings.index.synonyms = vec!["math, mathematics".to_string()];
        let body = index_body(&settings).unwrap();

        assert_eq!(
            body["settings"]["analysis"]["filter"]["synonym"]["synonyms"],
            json!(["math, mathematics"])
        );
        assert!(body["settings"]["analysis"]["analyzer"]["snowball_with_synonyms"].is_object());
        assert!(body["mappings"]["modelresult"]["properties"]["django_id"].is_object());
    }
}
