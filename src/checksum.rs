//! Checksum utilities for snapshot integrity

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, SchemaError};

/// SHA256 checksum of materialized content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn of_content(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Checksum of a file on disk, or `None` if it does not exist
    pub fn of_file(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(Self::from_bytes(&bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SchemaError::io(path, e)),
        }
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &str) -> bool {
        *self == Self::of_content(content)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
