//! Backend settings
//!
//! Settings are an explicit value handed to the backend at construction.
//! Every field has a default, so an empty TOML file is a valid configuration.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

const BOOST_MODES: [&str; 6] = ["multiply", "replace", "sum", "avg", "max", "min"];
const SCORE_MODES: [&str; 6] = ["multiply", "sum", "avg", "first", "max", "min"];

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub query: QuerySettings,
    pub features: Features,
    pub boost: BoostSettings,
    pub index: IndexSettings,
    pub analyzers: AnalyzerSettings,
    pub schema: SchemaSettings,
}

/// Connection to the search engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub url: String,
    /// Alias that searches go through and rebuilds repoint
    pub index_name: String,
    pub timeout_secs: u64,
    /// Turn transport failures into empty results instead of errors
    pub silently_fail: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            index_name: "catalog".to_string(),
            timeout_secs: 10,
            silently_fail: true,
        }
    }
}

/// Query string defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub content_field: String,
    pub default_operator: String,
    pub fuzzy_min_sim: f64,
    pub fuzzy_max_expansions: u32,
    pub include_spelling: bool,
    /// Content types hits may belong to; empty accepts every type
    pub indexed_models: Vec<String>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            content_field: "text".to_string(),
            default_operator: "AND".to_string(),
            fuzzy_min_sim: 0.5,
            fuzzy_max_expansions: 50,
            include_spelling: false,
            indexed_models: Vec::new(),
        }
    }
}

/// Optional backend behaviors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Cardinality-based hit and facet counts when a request asks for them
    pub distinct_counts: bool,
    /// Function-score wrapped query strings instead of the analyzer-heavy default
    pub simple_query: bool,
    /// Never delete indices on clear; rebuilds go to a fresh index
    pub non_clearing: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            distinct_counts: true,
            simple_query: true,
            non_clearing: true,
        }
    }
}

impl Features {
    /// Plain faceted search with no optional behavior
    pub fn none() -> Self {
        Self {
            distinct_counts: false,
            simple_query: false,
            non_clearing: false,
        }
    }
}

/// Relevance boosting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostSettings {
    pub function_score: FunctionScore,
}

/// Function-score parameters; the query itself is filled in per search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionScore {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_boost: Option<f64>,
    /// Engine-native scoring functions (`filter` + `weight`, decay functions, ...)
    pub functions: Vec<Value>,
}

impl Default for FunctionScore {
    fn default() -> Self {
        Self {
            boost_mode: Some("sum".to_string()),
            score_mode: Some("sum".to_string()),
            boost: Some(1.0),
            max_boost: None,
            functions: Vec::new(),
        }
    }
}

impl FunctionScore {
    /// Function-score body without a query
    pub fn to_json(&self) -> Map<String, Value> {
        let mut body = Map::new();
        if let Some(mode) = &self.boost_mode {
            body.insert("boost_mode".to_string(), Value::String(mode.clone()));
        }
        if let Some(mode) = &self.score_mode {
            body.insert("score_mode".to_string(), Value::String(mode.clone()));
        }
        if let Some(boost) = self.boost {
            body.insert("boost".to_string(), Value::from(boost));
        }
        if let Some(max_boost) = self.max_boost {
            body.insert("max_boost".to_string(), Value::from(max_boost));
        }
        body.insert(
            "functions".to_string(),
            Value::Array(self.functions.clone()),
        );
        body
    }
}

/// Index rebuild settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Largest relative change in record count a rebuild may introduce
    pub size_change_threshold: f64,
    /// Documents per bulk request
    pub batch_size: usize,
    /// Synonym groups, e.g. `"math, mathematics"`
    pub synonyms: Vec<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            size_change_threshold: 0.1,
            batch_size: 1000,
            synonyms: Vec::new(),
        }
    }
}

/// Separate index-time and search-time analyzers for one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerOverride {
    pub field: String,
    pub index_analyzer: String,
    pub search_analyzer: String,
}

impl AnalyzerOverride {
    pub fn new(
        field: impl Into<String>,
        index_analyzer: impl Into<String>,
        search_analyzer: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            index_analyzer: index_analyzer.into(),
            search_analyzer: search_analyzer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Fields analyzed with this analyzer are switched to `synonym_analyzer`
    pub replaced_analyzer: String,
    pub synonym_analyzer: String,
    pub overrides: Vec<AnalyzerOverride>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            replaced_analyzer: "snowball".to_string(),
            synonym_analyzer: "snowball_with_synonyms".to_string(),
            overrides: vec![
                AnalyzerOverride::new(
                    "title_autocomplete",
                    "ngram_analyzer",
                    "snowball_with_synonyms",
                ),
                AnalyzerOverride::new(
                    "authoring_organizations_autocomplete",
                    "ngram_analyzer",
                    "snowball_with_synonyms",
                ),
            ],
        }
    }
}

/// Field types understood by the schema builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    String,
    EdgeNgram,
    Ngram,
    Date,
    Datetime,
    Boolean,
    Integer,
    Float,
    Location,
}

fn default_boost() -> f64 {
    1.0
}

/// One indexed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Facetable fields are stored unanalyzed
    #[serde(default)]
    pub faceted: bool,
    #[serde(default = "default_boost")]
    pub boost: f64,
    /// The main full-text field
    #[serde(default)]
    pub document: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            faceted: false,
            boost: default_boost(),
            document: false,
        }
    }

    pub fn faceted(mut self) -> Self {
        self.faceted = true;
        self
    }

    pub fn document(mut self) -> Self {
        self.document = true;
        self
    }

    pub fn with_boost(mut self, boost: f64) -> Self {
        self.boost = boost;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSettings {
    pub fields: Vec<FieldDefinition>,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldDefinition::new("text", FieldKind::String).document(),
                FieldDefinition::new("title", FieldKind::String).with_boost(2.0),
                FieldDefinition::new("title_autocomplete", FieldKind::Ngram),
                FieldDefinition::new("authoring_organizations_autocomplete", FieldKind::Ngram),
                FieldDefinition::new("key", FieldKind::String).faceted(),
                FieldDefinition::new("course_key", FieldKind::String).faceted(),
                FieldDefinition::new("org", FieldKind::String).faceted(),
                FieldDefinition::new("subjects", FieldKind::String).faceted(),
                FieldDefinition::new("pacing_type", FieldKind::String).faceted(),
                FieldDefinition::new("start", FieldKind::Datetime),
            ],
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Validation is left to [`validate`].
    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::validation(format!("Cannot render settings: {}", e)))
    }
}

/// Read, parse and validate a settings file
pub fn load(path: &Path) -> Result<Settings> {
    let raw = fs::read_to_string(path).map_err(|source| Error::ReadSettings {
        path: path.to_path_buf(),
        source,
    })?;

    let settings = Settings::from_toml(&raw).map_err(|source| Error::ParseSettings {
        path: path.to_path_buf(),
        source,
    })?;

    validate(&settings)?;

    tracing::debug!("Loaded settings from {:?}", path);

    Ok(settings)
}

pub fn validate(settings: &Settings) -> Result<()> {
    let engine = &settings.engine;
    if !(engine.url.starts_with("http://") || engine.url.starts_with("https://")) {
        return Err(Error::validation(
            "engine.url must be an http:// or https:// URL",
        ));
    }
    if engine.index_name.trim().is_empty() {
        return Err(Error::validation("engine.index_name must be non-empty"));
    }
    if engine.index_name != engine.index_name.to_lowercase() {
        return Err(Error::validation("engine.index_name must be lowercase"));
    }

    let query = &settings.query;
    if query.content_field.trim().is_empty() {
        return Err(Error::validation("query.content_field must be non-empty"));
    }
    if !matches!(query.default_operator.as_str(), "AND" | "OR") {
        return Err(Error::validation(
            "query.default_operator must be AND or OR",
        ));
    }

    let function_score = &settings.boost.function_score;
    if let Some(mode) = &function_score.boost_mode {
        if !BOOST_MODES.contains(&mode.as_str()) {
            return Err(Error::validation(format!(
                "boost.function_score.boost_mode must be one of {}",
                BOOST_MODES.join(", ")
            )));
        }
    }
    if let Some(mode) = &function_score.score_mode {
        if !SCORE_MODES.contains(&mode.as_str()) {
            return Err(Error::validation(format!(
                "boost.function_score.score_mode must be one of {}",
                SCORE_MODES.join(", ")
            )));
        }
    }

    let threshold = settings.index.size_change_threshold;
    if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
        return Err(Error::validation(
            "index.size_change_threshold must be in the range (0.0, 1.0]",
        ));
    }
    if settings.index.batch_size == 0 {
        return Err(Error::validation("index.batch_size must be greater than zero"));
    }

    let mut names = HashSet::new();
    for field in &settings.schema.fields {
        if field.name.trim().is_empty() {
            return Err(Error::validation("schema.fields.name must be non-empty"));
        }
        if !names.insert(field.name.as_str()) {
            return Err(Error::validation(format!(
                "schema.fields contains '{}' more than once",
                field.name
            )));
        }
    }
    if settings.schema.fields.iter().filter(|f| f.document).count() > 1 {
        return Err(Error::validation(
            "schema.fields may mark at most one field as the document field",
        ));
    }

    Ok(())
}
