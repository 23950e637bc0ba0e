//! Schema Materializer
//!
//! Turns a mutable `current` schema into immutable, version-named snapshots,
//! and inlines `$ref` pointers so a schema can be published on its own.
//!
//! ## Layout
//!
//! ```text
//! schemas/basic/
//! ├── current.yaml          (edited by hand, declares `version: 1.2.0`)
//! ├── 1.1.0.yaml
//! ├── 1.2.0.json
//! ├── 1.2.0.yaml
//! └── 1.2.0 -> 1.2.0.json   (alias to the first requested format)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use schema_materializer::{
//!     materialize_schema_version, ContentType, MaterializeOptions, SchemaDocument,
//! };
//!
//! let schema = SchemaDocument::load("schemas/basic/current.yaml")?;
//! let options = MaterializeOptions::new([ContentType::Json, ContentType::Yaml]).with_symlink(true);
//! let written = materialize_schema_version("schemas/basic", &schema, &options)?;
//! assert_eq!(written.len(), 3);
//! # Ok::<(), schema_materializer::SchemaError>(())
//! ```

pub mod checksum;
pub mod config;
pub mod content_type;
pub mod dereference;
pub mod error;
pub mod git;
pub mod materialize;
pub mod schema;
pub mod version;

pub use checksum::Checksum;
pub use config::MaterializerConfig;
pub use content_type::ContentType;
pub use dereference::{
    dereference_schema, DereferenceOptions, Dereferencer, FileResolver, MemoryResolver,
    ReferenceId, ReferenceResolver,
};
pub use error::{Result, SchemaError};
pub use git::{GitStager, NoopStager, Stager};
pub use materialize::{materialize_schema_version, materialize_schema_version_with, MaterializeOptions};
pub use schema::SchemaDocument;
pub use version::SchemaVersion;
