//! Pipeline builder with validation.

use super::failure::FailureMode;
use super::orchestrator::Pipeline;
use crate::config::PipelineConfig;
use crate::core::StageKind;
use crate::errors::{ConfigError, PipelineError};
use crate::events::EventSink;
use crate::stages::{ArtifactSink, ArtifactTransform, SourceReader, StagePorts};
use std::sync::Arc;

/// Builder for creating validated pipelines.
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    reader: Option<Arc<dyn SourceReader>>,
    transform: Option<Arc<dyn ArtifactTransform>>,
    sink: Option<Arc<dyn ArtifactSink>>,
    events: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the same concurrency for every stage.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config = self.config.with_concurrency(concurrency);
        self
    }

    /// Sets the concurrency of one stage.
    #[must_use]
    pub fn stage_concurrency(mut self, stage: StageKind, concurrency: usize) -> Self {
        self.config = match stage {
            StageKind::Fetch => self.config.with_fetch_concurrency(concurrency),
            StageKind::Transform => self.config.with_transform_concurrency(concurrency),
            StageKind::Persist => self.config.with_persist_concurrency(concurrency),
        };
        self
    }

    /// Sets the queue capacity of one stage.
    #[must_use]
    pub fn queue_capacity(mut self, stage: StageKind, capacity: usize) -> Self {
        self.config = self.config.with_queue_capacity(stage, capacity);
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.config = self.config.with_failure_mode(mode);
        self
    }

    /// Sets the source reader.
    #[must_use]
    pub fn reader(mut self, reader: impl SourceReader + 'static) -> Self {
        self.reader = Some(Arc::new(reader));
        self
    }

    /// Sets the artifact transform.
    #[must_use]
    pub fn transform(mut self, transform: impl ArtifactTransform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Sets the artifact sink.
    #[must_use]
    pub fn sink(mut self, sink: impl ArtifactSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a collaborator is missing or a
    /// limit is zero.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let reader = self
            .reader
            .ok_or(ConfigError::MissingCollaborator("source reader"))?;
        let transform = self
            .transform
            .ok_or(ConfigError::MissingCollaborator("artifact transform"))?;
        let sink = self
            .sink
            .ok_or(ConfigError::MissingCollaborator("artifact sink"))?;

        let pipeline = Pipeline::new(self.config, StagePorts::new(reader, transform, sink))?;
        Ok(match self.events {
            Some(events) => pipeline.with_event_sink(events),
            None => pipeline,
        })
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("has_reader", &self.reader.is_some())
            .field("has_transform", &self.transform.is_some())
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
