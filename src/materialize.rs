//! Version materialization
//!
//! Writes immutable, version-named snapshots of a schema next to its source:
//!
//! ```text
//! schemas/basic/
//! ├── current.yaml        (source, never touched)
//! ├── 1.2.0.json
//! ├── 1.2.0.yaml
//! └── 1.2.0 -> 1.2.0.json (first requested content type)
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::checksum::Checksum;
use crate::content_type::ContentType;
use crate::error::{IoResultExt, Result, SchemaError};
use crate::git::{GitStager, NoopStager, Stager};
use crate::schema::SchemaDocument;
use crate::version::SchemaVersion;

/// Options controlling a materialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeOptions {
    /// Point a `<version>` symlink at the first content type's file
    #[serde(alias = "shouldSymlink")]
    pub should_symlink: bool,
    /// Formats to write, in order. The first one is the symlink target.
    #[serde(alias = "contentTypes")]
    pub content_types: Vec<ContentType>,
    /// Stage every written path with git
    #[serde(alias = "shouldGitAdd")]
    pub should_git_add: bool,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            should_symlink: false,
            content_types: vec![ContentType::Yaml],
            should_git_add: false,
        }
    }
}

impl MaterializeOptions {
    /// Options writing the given content types, no symlink, no staging
    pub fn new(content_types: impl IntoIterator<Item = ContentType>) -> Self {
        Self {
            content_types: content_types.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Set whether to create the version symlink
    pub fn with_symlink(mut self, should_symlink: bool) -> Self {
        self.should_symlink = should_symlink;
        self
    }

    /// Set whether to stage written files
    pub fn with_git_add(mut self, should_git_add: bool) -> Self {
        self.should_git_add = should_git_add;
        self
    }

    /// Content types in request order with repeats dropped.
    ///
    /// Fails if none were requested.
    pub fn ordered_content_types(&self) -> Result<Vec<ContentType>> {
        let mut ordered = Vec::with_capacity(self.content_types.len());
        for content_type in &self.content_types {
            if !ordered.contains(content_type) {
                ordered.push(*content_type);
            }
        }
        if ordered.is_empty() {
            return Err(SchemaError::config("at least one content type is required"));
        }
        Ok(ordered)
    }
}

/// Materialize a schema version into `schema_directory`.
///
/// Returns the absolute paths written: one file per content type in request
/// order, then the symlink if one was created. Staging uses [`GitStager`]
/// when `should_git_add` is set.
pub fn materialize_schema_version(
    schema_directory: impl AsRef<Path>,
    schema: &SchemaDocument,
    options: &MaterializeOptions,
) -> Result<Vec<PathBuf>> {
    if options.should_git_add {
        materialize_schema_version_with(schema_directory, schema, options, &GitStager::new())
    } else {
        materialize_schema_version_with(schema_directory, schema, options, &NoopStager)
    }
}

/// Like [`materialize_schema_version`] with an explicit stager.
///
/// Input is fully validated and every content type encoded before the first
/// write. A failed write leaves earlier files of the same call in place.
pub fn materialize_schema_version_with(
    schema_directory: impl AsRef<Path>,
    schema: &SchemaDocument,
    options: &MaterializeOptions,
    stager: &dyn Stager,
) -> Result<Vec<PathBuf>> {
    let content_types = options.ordered_content_types()?;
    let version = schema.version()?;

    let schema_directory = schema_directory.as_ref();
    // Absolute, but symlinks in the caller's path are kept
    let dir = std::path::absolute(schema_directory).at(schema_directory)?;
    fs::metadata(&dir).at(schema_directory)?;

    let mut rendered = Vec::with_capacity(content_types.len());
    for content_type in &content_types {
        rendered.push((*content_type, schema.encode(*content_type)?));
    }

    let mut materialized = Vec::with_capacity(rendered.len() + 1);
    for (content_type, content) in &rendered {
        let path = dir.join(version.file_name(*content_type));
        write_snapshot(&path, content)?;
        materialized.push(path);
    }

    if options.should_symlink {
        let link = dir.join(version.alias_name());
        replace_alias(&link, &version, content_types[0])?;
        materialized.push(link);
    }

    if options.should_git_add {
        stager.add(&materialized)?;
    }

    tracing::info!(
        version = %version,
        directory = %dir.display(),
        files = materialized.len(),
        "materialized schema version"
    );

    Ok(materialized)
}

/// Write one snapshot, overwriting any existing file.
///
/// An overwrite that changes the bytes of an existing version is reported,
/// since it rewrites history for that version.
fn write_snapshot(path: &Path, content: &str) -> Result<()> {
    match Checksum::of_file(path)? {
        Some(previous) if previous.verify(content) => {
            tracing::debug!(path = %path.display(), "snapshot unchanged");
        }
        Some(previous) => {
            let next = Checksum::of_content(content);
            let old = fs::read_to_string(path).at(path)?;
            let changed = TextDiff::from_lines(old.as_str(), content)
                .iter_all_changes()
                .filter(|change| change.tag() != ChangeTag::Equal)
                .count();
            tracing::warn!(
                path = %path.display(),
                %previous,
                %next,
                changed_lines = changed,
                "overwriting existing version snapshot with different content"
            );
        }
        None => {
            tracing::debug!(
                path = %path.display(),
                checksum = %Checksum::of_content(content),
                "writing snapshot"
            );
        }
    }

    fs::write(path, content).at(path)
}

/// Replace whatever is at `link` with an alias to the snapshot for `target`
fn replace_alias(link: &Path, version: &SchemaVersion, target: ContentType) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(link).at(link)?,
        Ok(_) => fs::remove_file(link).at(link)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(SchemaError::io(link, e)),
    }

    let target_name = version.file_name(target);
    tracing::info!(link = %link.display(), target = %target_name, "updating version symlink");

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target_name, link).at(link)?;

    #[cfg(not(unix))]
    {
        let source = link.with_file_name(&target_name);
        fs::copy(&source, link).at(link)?;
    }

    Ok(())
}
