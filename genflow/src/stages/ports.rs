//! Collaborator ports injected into the stages.
//!
//! The pipeline does not know how sources are read, how content becomes
//! artifacts, or where artifacts go. Each concern is a trait object handed
//! in through [`StagePorts`].

use crate::core::{Artifact, ArtifactSequence, RawContent, SourceItem};
use async_trait::async_trait;
use std::sync::Arc;

/// Reads the raw text behind a source identifier.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Returns the full text of `item`.
    async fn read(&self, item: &SourceItem) -> anyhow::Result<String>;
}

/// Turns fetched content into a lazy sequence of artifacts.
///
/// Implementations should return quickly and do the per-artifact work
/// inside the returned sequence; the sequence is drained by the persist
/// stage.
#[async_trait]
pub trait ArtifactTransform: Send + Sync {
    /// Starts producing artifacts for `content`.
    async fn transform(&self, content: RawContent) -> anyhow::Result<ArtifactSequence>;
}

/// Durably stores one artifact.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Writes `artifact`.
    async fn write(&self, artifact: &Artifact) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: SourceReader + ?Sized> SourceReader for Arc<T> {
    async fn read(&self, item: &SourceItem) -> anyhow::Result<String> {
        (**self).read(item).await
    }
}

#[async_trait]
impl<T: ArtifactTransform + ?Sized> ArtifactTransform for Arc<T> {
    async fn transform(&self, content: RawContent) -> anyhow::Result<ArtifactSequence> {
        (**self).transform(content).await
    }
}

#[async_trait]
impl<T: ArtifactSink + ?Sized> ArtifactSink for Arc<T> {
    async fn write(&self, artifact: &Artifact) -> anyhow::Result<()> {
        (**self).write(artifact).await
    }
}

/// The three collaborators a run needs.
#[derive(Clone)]
pub struct StagePorts {
    /// Source of raw content.
    pub reader: Arc<dyn SourceReader>,
    /// Content to artifact transform.
    pub transform: Arc<dyn ArtifactTransform>,
    /// Artifact destination.
    pub sink: Arc<dyn ArtifactSink>,
}

impl StagePorts {
    /// Bundles the collaborators.
    pub fn new(
        reader: Arc<dyn SourceReader>,
        transform: Arc<dyn ArtifactTransform>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            reader,
            transform,
            sink,
        }
    }
}

impl std::fmt::Debug for StagePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePorts").finish_non_exhaustive()
    }
}
