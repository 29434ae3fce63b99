//! Reads sources from files and writes artifacts into a directory.

use crate::core::{Artifact, SourceItem};
use crate::stages::{ArtifactSink, SourceReader};
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Reads each source item as a UTF-8 file path.
///
/// Relative items are resolved against the root, if one is set.
#[derive(Debug, Clone, Default)]
pub struct FileSourceReader {
    root: Option<PathBuf>,
}

impl FileSourceReader {
    /// Creates a reader that uses item paths as given.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reader that resolves relative items under `root`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Returns the path an item is read from.
    #[must_use]
    pub fn resolve(&self, item: &SourceItem) -> PathBuf {
        let path = Path::new(item.as_str());
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl SourceReader for FileSourceReader {
    async fn read(&self, item: &SourceItem) -> anyhow::Result<String> {
        let path = self.resolve(item);
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read source file '{}'", path.display()))?;
        debug!(path = %path.display(), bytes = text.len(), "Read source file");
        Ok(text)
    }
}

/// Writes each artifact to `<dir>/<artifact name>`, replacing existing files.
///
/// Artifact names may contain `/` to place files in subdirectories, which
/// are created as needed. Names that would leave the directory are
/// rejected.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates a sink writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file an artifact is written to.
    ///
    /// # Errors
    ///
    /// Returns an error for empty, absolute or parent-relative names.
    pub fn target(&self, artifact: &Artifact) -> anyhow::Result<PathBuf> {
        let name = Path::new(&artifact.name);
        if artifact.name.is_empty() {
            bail!("Artifact name is empty");
        }
        if !name
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!(
                "Artifact name '{}' escapes the output directory",
                artifact.name
            );
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn write(&self, artifact: &Artifact) -> anyhow::Result<()> {
        let path = self.target(artifact)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
        }
        tokio::fs::write(&path, artifact.content.as_bytes())
            .await
            .with_context(|| format!("Failed to write artifact file '{}'", path.display()))?;
        debug!(path = %path.display(), bytes = artifact.len(), "Wrote artifact file");
        Ok(())
    }
}
