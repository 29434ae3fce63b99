//! The pipeline: submits source items and waits for every artifact.

use super::builder::PipelineBuilder;
use super::coordinator::{CompletionCoordinator, StageHandle};
use super::failure::FailureLog;
use super::report::RunReport;
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{RunState, SourceItem, StageKind};
use crate::errors::PipelineError;
use crate::events::{self, EventSink, NoOpEventSink};
use crate::pool::PoolSpec;
use crate::stages::{
    spawn_fetch_stage, spawn_persist_stage, spawn_transform_stage, StageContext, StagePorts,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A fetch, transform, persist pipeline.
///
/// The pipeline holds only configuration and collaborators. Every run
/// builds fresh stage pools, so one pipeline can be run many times.
pub struct Pipeline {
    config: PipelineConfig,
    ports: StagePorts,
    events: Arc<dyn EventSink>,
}

impl Pipeline {
    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any limit is zero.
    pub fn new(config: PipelineConfig, ports: StagePorts) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            ports,
            events: Arc::new(NoOpEventSink),
        })
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every item through the pipeline.
    ///
    /// Returns once every artifact of every accepted item has been written,
    /// or with the first recorded failure.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the run.
    pub async fn generate<I, S>(&self, items: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceItem>,
    {
        self.run(items).await?.into_result().map(|_| ())
    }

    /// Runs every item through the pipeline and reports on the run.
    ///
    /// Item failures are part of the report, not an `Err`. Dropping the
    /// returned future before it resolves aborts every stage of the run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the stages could not be started.
    pub async fn run<I, S>(&self, items: I) -> Result<RunReport, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceItem>,
    {
        let run_id = Uuid::new_v4();
        let items = items.into_iter().map(Into::into);
        self.execute(run_id, items)
            .instrument(info_span!("pipeline_run", run_id = %run_id))
            .await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        mut items: impl Iterator<Item = SourceItem>,
    ) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let mode = self.config.failure_mode;
        let failures = Arc::new(FailureLog::new(mode, self.events.clone()));
        let ctx = StageContext::new(failures.clone(), self.events.clone());
        let mut guard = AbortOnDrop::new(ctx.abort.clone());

        let persist = Arc::new(spawn_persist_stage(
            self.pool_spec(StageKind::Persist),
            self.ports.sink.clone(),
            &ctx,
        )?);
        let transform = Arc::new(spawn_transform_stage(
            self.pool_spec(StageKind::Transform),
            self.ports.transform.clone(),
            persist.clone(),
            &ctx,
        )?);
        let fetch = Arc::new(spawn_fetch_stage(
            self.pool_spec(StageKind::Fetch),
            self.ports.reader.clone(),
            transform.clone(),
            &ctx,
        )?);

        let stages: Vec<Arc<dyn StageHandle>> =
            vec![fetch.clone(), transform.clone(), persist.clone()];
        let coordinator = CompletionCoordinator::chain(stages, self.events.clone());
        coordinator.start();

        info!(failure_mode = %mode, "Pipeline run started");
        self.events
            .emit(
                events::PIPELINE_STARTED,
                Some(serde_json::json!({
                    "run_id": run_id.to_string(),
                    "config": &self.config,
                })),
            )
            .await;

        let mut state = RunState::Idle;
        self.enter(&mut state, RunState::Submitting).await?;

        let mut submitted = 0_usize;
        let mut skipped = 0_usize;
        let mut stopped = false;
        for item in items.by_ref() {
            let accepted = !failures.is_halted()
                && tokio::select! {
                    biased;
                    () = failures.halted() => false,
                    result = fetch.submit(item) => match result {
                        Ok(()) => true,
                        Err(err) => {
                            debug!(error = %err, "Fetch stage refused item");
                            false
                        }
                    },
                };
            if !accepted {
                stopped = true;
                break;
            }
            submitted += 1;
        }
        if stopped {
            // Lower bound only; the rest of the input is never pulled.
            let (remaining, _) = items.size_hint();
            skipped = remaining.saturating_add(1);
            warn!(submitted, skipped, "Submission stopped after a failure");
        }

        fetch.close();
        self.events
            .emit(
                events::STAGE_CLOSED,
                Some(serde_json::json!({ "stage": StageKind::Fetch.as_str() })),
            )
            .await;
        self.enter(&mut state, RunState::Draining).await?;

        for failure in coordinator.completion().await {
            warn!(task = %failure.task, error = %failure.message, "Completion watcher failed");
        }
        // Every stage pool has finished once the tail has.
        fetch.completion().await;
        transform.completion().await;
        guard.disarm();

        let final_state = if failures.has_failures() {
            RunState::Failed
        } else {
            RunState::Completed
        };
        self.enter(&mut state, final_state).await?;

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            state,
            failure_mode: mode,
            items_submitted: submitted,
            items_skipped: skipped,
            artifacts_persisted: ctx.artifacts_persisted(),
            failures: failures.records(),
            stages: vec![fetch.snapshot(), transform.snapshot(), persist.snapshot()],
            first_error: failures.take_first(),
        };

        let summary = serde_json::json!({
            "run_id": run_id.to_string(),
            "items_submitted": report.items_submitted,
            "artifacts_persisted": report.artifacts_persisted,
            "failures": report.failures.len(),
            "duration_ms": report.duration_ms(),
        });
        if report.state == RunState::Completed {
            info!(
                items = report.items_submitted,
                artifacts = report.artifacts_persisted,
                duration_ms = report.duration_ms(),
                "Pipeline run completed"
            );
            self.events
                .emit(events::PIPELINE_COMPLETED, Some(summary))
                .await;
        } else {
            warn!(
                items = report.items_submitted,
                artifacts = report.artifacts_persisted,
                failures = report.failures.len(),
                "Pipeline run failed"
            );
            self.events.emit(events::PIPELINE_FAILED, Some(summary)).await;
        }

        Ok(report)
    }

    async fn enter(&self, state: &mut RunState, next: RunState) -> Result<(), PipelineError> {
        let from = *state;
        *state = from.transition(next)?;
        debug!(from = %from, to = %next, "Run state changed");
        self.events
            .emit(
                events::PIPELINE_STATE_CHANGED,
                Some(serde_json::json!({ "from": from, "to": next })),
            )
            .await;
        Ok(())
    }

    fn pool_spec(&self, stage: StageKind) -> PoolSpec {
        PoolSpec::new(stage, self.config.concurrency(stage))
            .with_queue_capacity(self.config.queue_capacity(stage))
    }
}

/// Aborts every stage of a run whose future is dropped before the stages
/// have finished.
struct AbortOnDrop {
    abort: Arc<CancellationToken>,
    armed: bool,
}

impl AbortOnDrop {
    fn new(abort: Arc<CancellationToken>) -> Self {
        Self { abort, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if self.armed && self.abort.cancel("pipeline run dropped before completion") {
            warn!("Pipeline run dropped before completion, stages aborted");
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
