//! Serialization formats a schema can be materialized into

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// Serialization format of a materialized schema file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// YAML, block style
    #[serde(alias = "yml")]
    #[value(alias = "yml")]
    Yaml,
    /// Pretty-printed JSON
    Json,
}

impl ContentType {
    /// Get the file extension for this content type
    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Yaml => "yaml",
            ContentType::Json => "json",
        }
    }

    /// Guess the content type from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(ContentType::Yaml),
            "json" => Some(ContentType::Json),
            _ => None,
        }
    }

    /// Serialize a document.
    ///
    /// Keys keep the order they were read in. JSON output ends with a newline
    /// so materialized files diff cleanly.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        match self {
            ContentType::Yaml => Ok(serde_yaml::to_string(value)?),
            ContentType::Json => {
                let mut out = serde_json::to_string_pretty(value)?;
                out.push('\n');
                Ok(out)
            }
        }
    }

    /// Parse a document
    pub fn decode(&self, content: &str) -> Result<Value> {
        match self {
            ContentType::Yaml => Ok(serde_yaml::from_str(content)?),
            ContentType::Json => Ok(serde_json::from_str(content)?),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContentType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s.trim())
            .ok_or_else(|| SchemaError::config(format!("unrecognized content type '{}'", s)))
    }
}
