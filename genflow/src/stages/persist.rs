//! Persist stage: drains artifact sequences into the sink.

use super::{ArtifactSink, StageContext};
use crate::core::ArtifactSequence;
use crate::errors::PipelineError;
use crate::events;
use crate::pool::{PoolSpec, WorkerPool};
use std::sync::Arc;
use tracing::debug;

/// Starts the persist pool.
///
/// Each worker drains one sequence to exhaustion, writing artifacts in the
/// order they are produced, before it takes the next sequence. After a
/// hard abort a worker stops between artifacts.
///
/// # Errors
///
/// Returns a configuration error for a zero-sized pool.
pub fn spawn_persist_stage(
    spec: PoolSpec,
    sink: Arc<dyn ArtifactSink>,
    ctx: &StageContext,
) -> Result<WorkerPool<ArtifactSequence>, PipelineError> {
    let stage_ctx = ctx.clone();
    WorkerPool::spawn(
        spec,
        ctx.failures.clone(),
        ctx.abort.clone(),
        move |sequence: ArtifactSequence| {
            let sink = sink.clone();
            let ctx = stage_ctx.clone();
            async move { drain(sequence, sink.as_ref(), &ctx).await }
        },
    )
}

async fn drain(
    mut sequence: ArtifactSequence,
    sink: &dyn ArtifactSink,
    ctx: &StageContext,
) -> Result<(), PipelineError> {
    let item = sequence.source().clone();
    loop {
        if ctx.abort.is_cancelled() {
            debug!(item = %item, written = sequence.yielded(), "Stopped draining after abort");
            return Ok(());
        }
        let Some(next) = sequence.next_artifact().await else {
            break;
        };
        let artifact = next.map_err(|e| PipelineError::transform(item.clone(), e))?;
        sink.write(&artifact)
            .await
            .map_err(|e| PipelineError::write(item.clone(), artifact.name.clone(), e))?;

        ctx.record_persisted();
        ctx.events.try_emit(
            events::ARTIFACT_PERSISTED,
            Some(serde_json::json!({
                "item": item.as_str(),
                "artifact": artifact.name,
                "bytes": artifact.len(),
            })),
        );
    }
    debug!(item = %item, artifacts = sequence.yielded(), "Persisted source");
    Ok(())
}
