//! Version-control staging of materialized files

use std::fs;
use std::path::{Path, PathBuf};

use git2::Repository;

use crate::error::{IoResultExt, Result, SchemaError};

/// Stages written files with a version-control system
pub trait Stager {
    /// Stage every path; paths are absolute
    fn add(&self, paths: &[PathBuf]) -> Result<()>;
}

/// Stager that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStager;

impl Stager for NoopStager {
    fn add(&self, _paths: &[PathBuf]) -> Result<()> {
        Ok(())
    }
}

/// Stager that adds paths to the index of the enclosing Git repository
#[derive(Debug, Clone, Default)]
pub struct GitStager {
    /// Repository to use instead of discovering one from the staged paths
    repo_path: Option<PathBuf>,
}

impl GitStager {
    /// Discover the repository from the first staged path
    pub fn new() -> Self {
        Self::default()
    }

    /// Always stage into the repository at `path`
    pub fn with_repository(path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: Some(path.into()),
        }
    }

    fn open(&self, first: &Path) -> Result<Repository> {
        let repo = match &self.repo_path {
            Some(path) => Repository::open(path)?,
            None => Repository::discover(first.parent().unwrap_or(first))?,
        };
        Ok(repo)
    }
}

impl Stager for GitStager {
    fn add(&self, paths: &[PathBuf]) -> Result<()> {
        let Some(first) = paths.first() else {
            return Ok(());
        };

        let repo = self.open(first)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| SchemaError::config("cannot stage files in a bare repository"))?;
        let workdir = fs::canonicalize(workdir).at(workdir)?;

        let mut index = repo.index()?;
        for path in paths {
            let path = resolve_parent(path)?;
            let relative = path.strip_prefix(&workdir).map_err(|_| {
                SchemaError::config(format!(
                    "{} is outside the repository at {}",
                    path.display(),
                    workdir.display()
                ))
            })?;
            tracing::debug!(path = %relative.display(), "git add");
            index.add_path(relative)?;
        }
        index.write()?;

        Ok(())
    }
}

/// Resolve symlinks in the directory part of `path`, keeping the final
/// component as is so an alias is staged as the link itself.
fn resolve_parent(path: &Path) -> Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            Ok(fs::canonicalize(parent).at(parent)?.join(name))
        }
        _ => Ok(path.to_path_buf()),
    }
}
