//! Schema documents

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content_type::ContentType;
use crate::error::{IoResultExt, Result, SchemaError};
use crate::version::{SchemaVersion, VERSION_FIELD};

/// A parsed schema document: an ordered mapping of string keys to values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDocument(Map<String, Value>);

impl SchemaDocument {
    /// Wrap a parsed value, which must be a mapping
    pub fn new(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SchemaError::config(format!(
                "schema document must be a mapping, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Load a schema from disk, decoding by file extension.
    ///
    /// Files without a recognized extension are read as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).at(path)?;
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ContentType::from_extension)
            .unwrap_or(ContentType::Yaml);
        tracing::debug!(path = %path.display(), %content_type, "loading schema");
        Self::new(content_type.decode(&content)?)
    }

    /// The declared version of this schema
    pub fn version(&self) -> Result<SchemaVersion> {
        SchemaVersion::from_field(self.0.get(VERSION_FIELD))
    }

    /// Get a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrow the underlying mapping
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Clone into a `serde_json::Value`
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Consume into a `serde_json::Value`
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Serialize with the given content type
    pub fn encode(&self, content_type: ContentType) -> Result<String> {
        content_type.encode(self)
    }
}

impl TryFrom<Value> for SchemaDocument {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SchemaDocument> for Value {
    fn from(doc: SchemaDocument) -> Self {
        doc.into_value()
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
