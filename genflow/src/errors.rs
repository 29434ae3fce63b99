//! Error types for the genflow pipeline.
//!
//! Every pipeline failure names the stage it happened in and, where there is
//! one, the source item (and artifact) it belongs to.

use crate::core::{InvalidTransition, SourceItem, StageKind};
use thiserror::Error;

/// The main error type for pipeline runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source reader could not produce content for an item.
    #[error("Failed to read source '{item}': {source}")]
    Read {
        /// The item that failed to read.
        item: SourceItem,
        /// The reader's error.
        #[source]
        source: anyhow::Error,
    },

    /// The transform rejected the content or failed while producing artifacts.
    #[error("Failed to transform source '{item}': {source}")]
    Transform {
        /// The item whose content failed to transform.
        item: SourceItem,
        /// The transform's error.
        #[source]
        source: anyhow::Error,
    },

    /// The sink rejected an artifact.
    #[error("Failed to write artifact '{artifact}' from source '{item}': {source}")]
    Write {
        /// The item the artifact was derived from.
        item: SourceItem,
        /// The artifact name.
        artifact: String,
        /// The sink's error.
        #[source]
        source: anyhow::Error,
    },

    /// The pipeline was configured with invalid values.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An item was handed to a stage that no longer accepts input.
    #[error("The {stage} stage is not accepting items")]
    Closed {
        /// The stage that rejected the item.
        stage: StageKind,
    },

    /// A worker task panicked or was torn down unexpectedly.
    #[error("Internal error in the {stage} stage: {message}")]
    Internal {
        /// The stage owning the worker.
        stage: StageKind,
        /// Description of what went wrong.
        message: String,
    },

    /// The run was driven through an illegal lifecycle transition.
    #[error(transparent)]
    State(#[from] InvalidTransition),
}

impl PipelineError {
    /// Creates a read error for an item.
    pub fn read(item: SourceItem, source: impl Into<anyhow::Error>) -> Self {
        Self::Read {
            item,
            source: source.into(),
        }
    }

    /// Creates a transform error for an item.
    pub fn transform(item: SourceItem, source: impl Into<anyhow::Error>) -> Self {
        Self::Transform {
            item,
            source: source.into(),
        }
    }

    /// Creates a write error for an artifact of an item.
    pub fn write(
        item: SourceItem,
        artifact: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Write {
            item,
            artifact: artifact.into(),
            source: source.into(),
        }
    }

    /// Returns the stage the failure belongs to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Read { .. } => Some(StageKind::Fetch),
            Self::Transform { .. } => Some(StageKind::Transform),
            Self::Write { .. } => Some(StageKind::Persist),
            Self::Closed { stage } | Self::Internal { stage, .. } => Some(*stage),
            Self::Config(_) | Self::State(_) => None,
        }
    }

    /// Returns the source item the failure belongs to, if any.
    #[must_use]
    pub fn item(&self) -> Option<&SourceItem> {
        match self {
            Self::Read { item, .. } | Self::Transform { item, .. } | Self::Write { item, .. } => {
                Some(item)
            }
            Self::Config(_) | Self::Closed { .. } | Self::Internal { .. } | Self::State(_) => {
                None
            }
        }
    }

    /// Returns the artifact name for write failures.
    #[must_use]
    pub fn artifact(&self) -> Option<&str> {
        match self {
            Self::Write { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    /// Returns a short type name for the error, used in reports and events.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Read { .. } => "ReadError",
            Self::Transform { .. } => "TransformError",
            Self::Write { .. } => "WriteError",
            Self::Config(_) => "ConfigError",
            Self::Closed { .. } => "ClosedError",
            Self::Internal { .. } => "InternalError",
            Self::State(_) => "StateError",
        }
    }
}

/// Error raised when a pipeline is configured with invalid values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A concurrency limit or queue capacity was zero.
    #[error("Invalid configuration: {field} must be a positive integer")]
    NonPositive {
        /// The offending field.
        field: &'static str,
    },

    /// A value read from the environment could not be parsed.
    #[error("Invalid configuration: '{value}' is not a valid value for {key}")]
    InvalidValue {
        /// The environment variable or key.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// The builder was finished without a required collaborator.
    #[error("Invalid configuration: no {0} was provided")]
    MissingCollaborator(&'static str),
}

/// Convenience result alias.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
