//! Configuration management for the schema materializer
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (materialize.toml)
//! - Environment variables (MATERIALIZE__*)
//!
//! ## Example config file (materialize.toml):
//! ```toml
//! [materialize]
//! content_types = ["json", "yaml"]
//! symlink = true
//! git_add = false
//! current_name = "current.yaml"
//!
//! [dereference]
//! marker_key = "$ref"
//! before_materialize = false
//! ```

use std::path::Path;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::content_type::ContentType;
use crate::dereference::{DereferenceOptions, DEFAULT_MARKER_KEY};
use crate::materialize::MaterializeOptions;

/// Main configuration for the schema materializer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializerConfig {
    /// Materialization defaults
    #[serde(default)]
    pub materialize: MaterializeConfig,

    /// Dereferencing settings
    #[serde(default)]
    pub dereference: DereferenceConfig,
}

/// Materialization defaults, used where the command line is silent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializeConfig {
    /// Formats to write, first one is the symlink target
    #[serde(default = "default_content_types")]
    pub content_types: Vec<ContentType>,

    /// Create the `<version>` symlink
    #[serde(default)]
    pub symlink: bool,

    /// Stage written files with git
    #[serde(default)]
    pub git_add: bool,

    /// File name of the mutable source schema
    #[serde(default = "default_current_name")]
    pub current_name: String,
}

/// Dereferencing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DereferenceConfig {
    /// Key marking an object as a reference
    #[serde(default = "default_marker_key")]
    pub marker_key: String,

    /// Inline references before materializing
    #[serde(default)]
    pub before_materialize: bool,
}

fn default_content_types() -> Vec<ContentType> {
    vec![ContentType::Yaml]
}

fn default_current_name() -> String {
    "current.yaml".to_string()
}

fn default_marker_key() -> String {
    DEFAULT_MARKER_KEY.to_string()
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            content_types: default_content_types(),
            symlink: false,
            git_add: false,
            current_name: default_current_name(),
        }
    }
}

impl Default for DereferenceConfig {
    fn default() -> Self {
        Self {
            marker_key: default_marker_key(),
            before_materialize: false,
        }
    }
}

impl MaterializeConfig {
    /// Materialization options built from these defaults
    pub fn options(&self) -> MaterializeOptions {
        MaterializeOptions::new(self.content_types.iter().copied())
            .with_symlink(self.symlink)
            .with_git_add(self.git_add)
    }
}

impl DereferenceConfig {
    /// Dereferencer options built from these settings
    pub fn options(&self) -> DereferenceOptions {
        DereferenceOptions {
            marker_key: self.marker_key.clone(),
        }
    }
}

impl MaterializerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "materialize.toml",
            ".materialize.toml",
            "config/materialize.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schema-materializer") {
            let xdg_config = config_dir.config_dir().join("materialize.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // MATERIALIZE__MATERIALIZE__SYMLINK=true, MATERIALIZE__MATERIALIZE__CONTENT_TYPES=json,yaml
        builder = builder.add_source(
            Environment::with_prefix("MATERIALIZE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("materialize.content_types"),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
