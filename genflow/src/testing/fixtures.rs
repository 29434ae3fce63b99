//! Test fixtures for pipeline testing.

use std::sync::Arc;

use super::mocks::{MemorySink, MemorySource, SplitTransform};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::CollectingEventSink;
use crate::pipeline::Pipeline;

/// In-memory collaborators plus the pipeline built around them.
///
/// The collaborators stay reachable through the fixture so a test can
/// inspect reads, writes and concurrency after the run.
#[derive(Debug)]
pub struct TestPipeline {
    /// The source reader.
    pub source: Arc<MemorySource>,
    /// The transform.
    pub transform: Arc<SplitTransform>,
    /// The sink.
    pub sink: Arc<MemorySink>,
    /// Every event of every run.
    pub events: Arc<CollectingEventSink>,
    /// The pipeline under test.
    pub pipeline: Pipeline,
}

impl TestPipeline {
    /// Builds a pipeline over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid `config`.
    pub fn new(
        source: MemorySource,
        transform: SplitTransform,
        sink: MemorySink,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let source = Arc::new(source);
        let transform = Arc::new(transform);
        let sink = Arc::new(sink);
        let events = Arc::new(CollectingEventSink::new());

        let pipeline = Pipeline::builder()
            .config(config)
            .reader(source.clone())
            .transform(transform.clone())
            .sink(sink.clone())
            .event_sink(events.clone())
            .build()?;

        Ok(Self {
            source,
            transform,
            sink,
            events,
            pipeline,
        })
    }

    /// Builds a pipeline with the default transform and sink.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid `config`.
    pub fn with_source(source: MemorySource, config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(source, SplitTransform::new(), MemorySink::new(), config)
    }

    /// Returns the sorted names of every written artifact.
    #[must_use]
    pub fn written_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sink.written().into_iter().map(|a| a.name).collect();
        names.sort();
        names
    }
}
