//! Source identifiers and fetched content.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// An opaque identifier for one input of a pipeline run.
///
/// Usually a file path or a logical name; the pipeline never interprets it,
/// it only hands it to the source reader and uses it to label failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceItem(String);

impl SourceItem {
    /// Creates a new source item.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the item, returning the identifier.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SourceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SourceItem {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceItem {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceItem {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&Path> for SourceItem {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for SourceItem {
    fn from(path: PathBuf) -> Self {
        Self::from(path.as_path())
    }
}

/// The fetched payload for one source item.
///
/// Moved from the fetch stage into the transform stage and dropped once the
/// transform has consumed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    source: SourceItem,
    text: String,
}

impl RawContent {
    /// Creates raw content for a source item.
    #[must_use]
    pub fn new(source: SourceItem, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }

    /// Returns the item this content was read from.
    #[must_use]
    pub fn source(&self) -> &SourceItem {
        &self.source
    }

    /// Returns the content.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the content length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns true if the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Splits the content into its source item and text.
    #[must_use]
    pub fn into_parts(self) -> (SourceItem, String) {
        (self.source, self.text)
    }
}
