//! The three pipeline stages.
//!
//! Each stage is a [`WorkerPool`] bound to one step of the flow:
//!
//! - fetch: [`SourceItem`] to [`RawContent`] through a [`SourceReader`]
//! - transform: [`RawContent`] to a lazy [`ArtifactSequence`] through an
//!   [`ArtifactTransform`]
//! - persist: drains each sequence into an [`ArtifactSink`]
//!
//! A stage forwards its output by submitting it to the next stage's pool,
//! so a full downstream queue holds the upstream worker (backpressure).
//!
//! [`SourceItem`]: crate::core::SourceItem
//! [`RawContent`]: crate::core::RawContent
//! [`ArtifactSequence`]: crate::core::ArtifactSequence

mod fetch;
mod persist;
mod ports;
mod transform;

pub use fetch::spawn_fetch_stage;
pub use persist::spawn_persist_stage;
pub use ports::{ArtifactSink, ArtifactTransform, SourceReader, StagePorts};
pub use transform::spawn_transform_stage;

use crate::cancellation::CancellationToken;
use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::pipeline::FailureLog;
use crate::pool::WorkerPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Run-wide state shared by the stages of one run.
#[derive(Clone)]
pub struct StageContext {
    /// Where failures are recorded.
    pub failures: Arc<FailureLog>,
    /// Cancelled on a hard abort.
    pub abort: Arc<CancellationToken>,
    /// Where events go.
    pub events: Arc<dyn EventSink>,
    persisted: Arc<AtomicU64>,
}

impl StageContext {
    /// Creates a context around a failure log.
    #[must_use]
    pub fn new(failures: Arc<FailureLog>, events: Arc<dyn EventSink>) -> Self {
        Self {
            abort: failures.abort_token(),
            failures,
            events,
            persisted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns how many artifacts have been written so far.
    #[must_use]
    pub fn artifacts_persisted(&self) -> u64 {
        self.persisted.load(Ordering::SeqCst)
    }

    pub(crate) fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("failures", &self.failures)
            .field("artifacts_persisted", &self.artifacts_persisted())
            .finish_non_exhaustive()
    }
}

/// Hands a stage's output to the next stage.
///
/// After a hard abort the downstream pool refuses new items; the output is
/// dropped instead of being reported as another failure.
async fn forward<T: Send + 'static>(
    downstream: &WorkerPool<T>,
    value: T,
) -> Result<(), PipelineError> {
    match downstream.submit(value).await {
        Err(PipelineError::Closed { stage }) if downstream.is_aborted() => {
            debug!(stage = %stage, "Dropped output after abort");
            Ok(())
        }
        other => other,
    }
}
