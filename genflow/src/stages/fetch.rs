//! Fetch stage: source identifier to raw content.

use super::{forward, SourceReader, StageContext};
use crate::core::{RawContent, SourceItem};
use crate::errors::PipelineError;
use crate::pool::{PoolSpec, WorkerPool};
use std::sync::Arc;
use tracing::debug;

/// Starts the fetch pool, forwarding every read into `downstream`.
///
/// # Errors
///
/// Returns a configuration error for a zero-sized pool.
pub fn spawn_fetch_stage(
    spec: PoolSpec,
    reader: Arc<dyn SourceReader>,
    downstream: Arc<WorkerPool<RawContent>>,
    ctx: &StageContext,
) -> Result<WorkerPool<SourceItem>, PipelineError> {
    WorkerPool::spawn(
        spec,
        ctx.failures.clone(),
        ctx.abort.clone(),
        move |item: SourceItem| {
            let reader = reader.clone();
            let downstream = downstream.clone();
            async move {
                let text = reader
                    .read(&item)
                    .await
                    .map_err(|e| PipelineError::read(item.clone(), e))?;
                debug!(item = %item, bytes = text.len(), "Fetched source");
                forward(&downstream, RawContent::new(item, text)).await
            }
        },
    )
}
