//! # Genflow
//!
//! A concurrent fetch, transform and persist pipeline for generated
//! artifacts.
//!
//! Each source item is read, turned into a lazily produced sequence of
//! artifacts, and every artifact is written out. The three steps run as
//! independent stages with their own concurrency limits:
//!
//! - **Bounded stages**: every stage is a worker pool over a bounded queue;
//!   a full queue holds back the stage feeding it
//! - **Lazy fan-out**: one source can yield any number of artifacts, drained
//!   one at a time inside a single persist slot
//! - **Cascading completion**: a stage is told "no more input" only after
//!   the stage before it has finished everything it accepted
//! - **Fail-fast**: the first failure stops new submissions and is returned
//!   to the caller
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genflow::prelude::*;
//! use genflow::io::{DirectorySink, FileSourceReader};
//! use genflow::testing::SplitTransform;
//!
//! # async fn example() -> Result<(), PipelineError> {
//! let pipeline = Pipeline::builder()
//!     .config(PipelineConfig::default().with_transform_concurrency(4))
//!     .reader(FileSourceReader::with_root("src"))
//!     .transform(SplitTransform::new())
//!     .sink(DirectorySink::new("out"))
//!     .build()?;
//!
//! pipeline.generate(["a.txt", "b.txt"]).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::core::{
        Artifact, ArtifactSequence, RawContent, RunState, SourceItem, StageKind,
    };
    pub use crate::errors::{ConfigError, PipelineError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{FailureMode, Pipeline, PipelineBuilder, RunReport};
    pub use crate::stages::{ArtifactSink, ArtifactTransform, SourceReader};
}
