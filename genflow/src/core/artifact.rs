//! Artifacts and the lazy per-source artifact sequence.

use super::SourceItem;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One persistable output unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    /// The name the sink stores the artifact under (e.g. `FooTests.cs`).
    pub name: String,
    /// The rendered content.
    pub content: String,
}

impl Artifact {
    /// Creates a new artifact.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Returns the content length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns true if the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// The boxed stream backing an [`ArtifactSequence`].
pub type ArtifactStream = BoxStream<'static, anyhow::Result<Artifact>>;

/// A lazy, ordered, finite sequence of artifacts derived from one source.
///
/// The sequence is produced step by step while it is consumed; each step may
/// suspend. It cannot be restarted. An `Err` step means the transform failed
/// part-way and no further artifacts should be expected from it.
pub struct ArtifactSequence {
    source: SourceItem,
    inner: ArtifactStream,
    yielded: usize,
}

impl ArtifactSequence {
    /// Wraps a stream of artifacts produced for `source`.
    pub fn new<S>(source: SourceItem, stream: S) -> Self
    where
        S: Stream<Item = anyhow::Result<Artifact>> + Send + 'static,
    {
        Self {
            source,
            inner: stream.boxed(),
            yielded: 0,
        }
    }

    /// Creates a sequence that yields nothing.
    #[must_use]
    pub fn empty(source: SourceItem) -> Self {
        Self::new(source, stream::empty())
    }

    /// Creates a sequence from artifacts that are already available.
    pub fn from_artifacts<I>(source: SourceItem, artifacts: I) -> Self
    where
        I: IntoIterator<Item = Artifact>,
        I::IntoIter: Send + 'static,
    {
        Self::new(source, stream::iter(artifacts.into_iter().map(Ok)))
    }

    /// Returns the item this sequence was derived from.
    #[must_use]
    pub fn source(&self) -> &SourceItem {
        &self.source
    }

    /// Returns how many artifacts have been pulled so far.
    #[must_use]
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Pulls the next artifact, suspending until it is produced.
    ///
    /// Returns `None` once the sequence is exhausted.
    pub async fn next_artifact(&mut self) -> Option<anyhow::Result<Artifact>> {
        StreamExt::next(self).await
    }
}

impl Stream for ArtifactSequence {
    type Item = anyhow::Result<Artifact>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(Ok(_))) = &poll {
            self.yielded += 1;
        }
        poll
    }
}

impl fmt::Debug for ArtifactSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactSequence")
            .field("source", &self.source)
            .field("yielded", &self.yielded)
            .finish_non_exhaustive()
    }
}
