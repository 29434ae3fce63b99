//! Event sink system for run observability.
//!
//! The pipeline reports lifecycle changes, failures and persisted artifacts
//! as structured events. Event names are the constants below.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run started; data carries the run id and configuration.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// The run moved between lifecycle states.
pub const PIPELINE_STATE_CHANGED: &str = "pipeline.state_changed";
/// The run finished with every artifact persisted.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// The run finished with at least one failure.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A stage was told no more input is coming.
pub const STAGE_CLOSED: &str = "stage.closed";
/// A failure was recorded against an item.
pub const ITEM_FAILED: &str = "item.failed";
/// An artifact was written by the sink.
pub const ARTIFACT_PERSISTED: &str = "artifact.persisted";
