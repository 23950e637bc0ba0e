//! Schema versioning utilities

use std::fmt;

use semver::Version;
use serde_json::Value;

use crate::content_type::ContentType;
use crate::error::{Result, SchemaError};

/// Field of a schema document holding its semantic version
pub const VERSION_FIELD: &str = "version";

/// The declared version of a schema document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    /// Semantic version (e.g., "1.2.3")
    pub version: Version,
}

impl SchemaVersion {
    /// Create a new schema version
    pub fn new(version: Version) -> Self {
        Self { version }
    }

    /// Create from a version string
    pub fn parse(version_str: &str) -> Result<Self> {
        let trimmed = version_str.trim();
        if trimmed.is_empty() {
            return Err(SchemaError::config("schema version is empty"));
        }
        let version = Version::parse(trimmed).map_err(|e| {
            SchemaError::config(format!("invalid schema version '{}': {}", version_str, e))
        })?;
        Ok(Self::new(version))
    }

    /// Read the `version` field of a schema document
    pub fn from_document(doc: &Value) -> Result<Self> {
        Self::from_field(doc.get(VERSION_FIELD))
    }

    /// Interpret the raw value of a `version` field
    pub fn from_field(field: Option<&Value>) -> Result<Self> {
        match field {
            Some(Value::String(s)) => Self::parse(s),
            Some(other) => Err(SchemaError::config(format!(
                "schema version must be a string, got {}",
                other
            ))),
            None => Err(SchemaError::config("schema is missing a 'version' field")),
        }
    }

    /// Get the version string (e.g., "1.2.3")
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    /// File name of the snapshot for a content type (e.g., "1.2.3.yaml")
    pub fn file_name(&self, content_type: ContentType) -> String {
        format!("{}.{}", self.version, content_type.extension())
    }

    /// Name of the version alias symlink (e.g., "1.2.3")
    pub fn alias_name(&self) -> String {
        self.version_string()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}
