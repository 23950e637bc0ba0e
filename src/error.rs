//! Error types for schema materialization and dereferencing

use std::path::PathBuf;

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema materializer errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unresolved reference '{reference}': {reason}")]
    UnresolvedReference { reference: String, reason: String },

    #[error("Cyclic reference: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

impl SchemaError {
    /// Build a configuration error from anything printable
    pub fn config(message: impl Into<String>) -> Self {
        SchemaError::Configuration(message.into())
    }

    /// Attach a path to an I/O failure
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SchemaError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Extension for tagging `std::io::Result`s with the path they touched
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| SchemaError::io(path, e))
    }
}
