//! Transform stage: raw content to a lazy artifact sequence.

use super::{forward, ArtifactTransform, StageContext};
use crate::core::{ArtifactSequence, RawContent};
use crate::errors::PipelineError;
use crate::pool::{PoolSpec, WorkerPool};
use std::sync::Arc;
use tracing::debug;

/// Starts the transform pool, forwarding every sequence into `downstream`.
///
/// Sequences are handed on undrained; producing their artifacts happens in
/// the persist stage.
///
/// # Errors
///
/// Returns a configuration error for a zero-sized pool.
pub fn spawn_transform_stage(
    spec: PoolSpec,
    transform: Arc<dyn ArtifactTransform>,
    downstream: Arc<WorkerPool<ArtifactSequence>>,
    ctx: &StageContext,
) -> Result<WorkerPool<RawContent>, PipelineError> {
    WorkerPool::spawn(
        spec,
        ctx.failures.clone(),
        ctx.abort.clone(),
        move |content: RawContent| {
            let transform = transform.clone();
            let downstream = downstream.clone();
            async move {
                let item = content.source().clone();
                let sequence = transform
                    .transform(content)
                    .await
                    .map_err(|e| PipelineError::transform(item.clone(), e))?;
                debug!(item = %item, "Transformed source");
                forward(&downstream, sequence).await
            }
        },
    )
}
