//! Outcome of one pipeline run.

use super::failure::{FailureMode, FailureRecord};
use crate::core::RunState;
use crate::errors::PipelineError;
use crate::pool::StageMetricsSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Everything known about a finished run.
///
/// Serializes to JSON for logs and diagnostics; the first error is kept
/// as a typed value and returned by [`RunReport::into_result`].
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// When submission started.
    pub started_at: DateTime<Utc>,
    /// When the last stage completed.
    pub finished_at: DateTime<Utc>,
    /// Final lifecycle state.
    pub state: RunState,
    /// Failure policy the run used.
    pub failure_mode: FailureMode,
    /// Items accepted by the fetch stage.
    pub items_submitted: usize,
    /// Items the caller offered but that were never submitted.
    ///
    /// A lower bound: the remaining input is counted from its size hint,
    /// never by pulling it.
    pub items_skipped: usize,
    /// Artifacts written by the sink.
    pub artifacts_persisted: u64,
    /// Every recorded failure, in recording order.
    pub failures: Vec<FailureRecord>,
    /// Per-stage counters, in flow order.
    pub stages: Vec<StageMetricsSnapshot>,
    #[serde(skip)]
    pub(crate) first_error: Option<PipelineError>,
}

impl RunReport {
    /// Returns true if the run completed without failures.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed && self.first_error.is_none()
    }

    /// Returns the first recorded error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&PipelineError> {
        self.first_error.as_ref()
    }

    /// Returns the wall-clock duration of the run in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Returns the counters of one stage.
    #[must_use]
    pub fn stage(&self, stage: crate::core::StageKind) -> Option<&StageMetricsSnapshot> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Converts the report into the run's single outcome.
    ///
    /// # Errors
    ///
    /// Returns the first recorded error if the run failed.
    pub fn into_result(mut self) -> Result<Self, PipelineError> {
        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
