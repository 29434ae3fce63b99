//! Core domain model types for genflow.
//!
//! This module contains the values that flow through a pipeline run:
//! - Source identifiers and fetched content
//! - Artifacts and the lazy per-source artifact sequence
//! - Stage and run status enums

mod artifact;
mod item;
mod status;

pub use artifact::{Artifact, ArtifactSequence, ArtifactStream};
pub use item::{RawContent, SourceItem};
pub use status::{InvalidTransition, RunState, StageKind};
