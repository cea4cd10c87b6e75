//! Documents as written to the engine

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Stored field holding the unique document id (`app_label.model_name.pk`)
pub const ID: &str = "id";
/// Stored field holding the content type (`app_label.model_name`)
pub const DJANGO_CT: &str = "django_ct";
/// Stored field holding the primary key
pub const DJANGO_ID: &str = "django_id";

/// Document type discriminator every document is indexed under
pub const DOC_TYPE: &str = "modelresult";

/// A document to be indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// `app_label.model_name`
    pub content_type: String,
    pub pk: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl IndexDocument {
    pub fn new(content_type: impl Into<String>, pk: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            pk: pk.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> String {
        format!("{}.{}", self.content_type, self.pk)
    }

    /// Source body including the bookkeeping fields
    pub fn to_source(&self) -> Value {
        let mut source = self.fields.clone();
        source.insert(ID.to_string(), Value::String(self.id()));
        source.insert(
            DJANGO_CT.to_string(),
            Value::String(self.content_type.clone()),
        );
        source.insert(DJANGO_ID.to_string(), Value::String(self.pk.clone()));
        Value::Object(source)
    }

    /// Rebuild a document from a stored source body
    pub fn from_source(source: Value) -> Result<Self> {
        let Value::Object(mut fields) = source else {
            return Err(Error::validation("Document source must be a JSON object"));
        };

        let content_type = match fields.remove(DJANGO_CT) {
            Some(Value::String(ct)) if ct.split('.').count() == 2 => ct,
            _ => {
                return Err(Error::validation(format!(
                    "Document source requires '{}' as 'app_label.model_name'",
                    DJANGO_CT
                )))
            }
        };

        let pk = match fields.remove(DJANGO_ID) {
            Some(Value::String(pk)) => pk,
            Some(Value::Number(pk)) => pk.to_string(),
            _ => {
                return Err(Error::validation(format!(
                    "Document source requires '{}'",
                    DJANGO_ID
                )))
            }
        };

        fields.remove(ID);

        Ok(Self {
            content_type,
            pk,
            fields,
        })
    }
}
