//! Failure recording and fail-fast policy.
//!
//! Every stage reports item failures into one shared [`FailureLog`]. The
//! log keeps the first error for the caller, a record of every failure for
//! the run report, and reacts to the first failure according to the
//! configured [`FailureMode`].

use crate::cancellation::CancellationToken;
use crate::core::{SourceItem, StageKind};
use crate::errors::PipelineError;
use crate::events::{self, EventSink};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// How the pipeline reacts to the first recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop submitting new items; let already-accepted items drain (default).
    #[default]
    FailFast,
    /// Stop submitting, discard queued items and stop draining sequences.
    Abort,
    /// Keep going; collect every failure.
    ContinueOnFailure,
}

impl FailureMode {
    /// Returns true if the first failure stops further submissions.
    #[must_use]
    pub const fn halts_submission(self) -> bool {
        matches!(self, Self::FailFast | Self::Abort)
    }

    /// Returns true if the first failure cancels accepted work.
    #[must_use]
    pub const fn aborts_in_flight(self) -> bool {
        matches!(self, Self::Abort)
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::Abort => write!(f, "abort"),
            Self::ContinueOnFailure => write!(f, "continue_on_failure"),
        }
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" | "soft" => Ok(Self::FailFast),
            "abort" | "hard" => Ok(Self::Abort),
            "continue_on_failure" | "continue" => Ok(Self::ContinueOnFailure),
            other => Err(format!("unknown failure mode: {other}")),
        }
    }
}

/// Serializable record of one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The stage the failure happened in.
    pub stage: Option<StageKind>,
    /// The item the failure belongs to.
    pub item: Option<SourceItem>,
    /// The artifact being written, for write failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Short error type (e.g. `ReadError`).
    pub error_type: String,
    /// Full error message.
    pub error: String,
    /// When the failure was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl From<&PipelineError> for FailureRecord {
    fn from(err: &PipelineError) -> Self {
        Self {
            stage: err.stage(),
            item: err.item().cloned(),
            artifact: err.artifact().map(str::to_string),
            error_type: err.error_type().to_string(),
            error: format!("{err:#}"),
            recorded_at: Utc::now(),
        }
    }
}

/// Thread-safe failure collector shared by every stage of one run.
pub struct FailureLog {
    mode: FailureMode,
    first: Mutex<Option<PipelineError>>,
    records: Mutex<Vec<FailureRecord>>,
    halt: CancellationToken,
    abort: Arc<CancellationToken>,
    events: Arc<dyn EventSink>,
}

impl FailureLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new(mode: FailureMode, events: Arc<dyn EventSink>) -> Self {
        Self {
            mode,
            first: Mutex::new(None),
            records: Mutex::new(Vec::new()),
            halt: CancellationToken::new(),
            abort: Arc::new(CancellationToken::new()),
            events,
        }
    }

    /// Returns the failure mode.
    #[must_use]
    pub fn mode(&self) -> FailureMode {
        self.mode
    }

    /// Records a failure.
    ///
    /// Returns true if this was the first failure of the run.
    pub fn record(&self, err: PipelineError) -> bool {
        let record = FailureRecord::from(&err);
        warn!(
            stage = ?record.stage,
            item = ?record.item,
            error_type = %record.error_type,
            error = %record.error,
            "Item failed"
        );
        self.events.try_emit(
            events::ITEM_FAILED,
            serde_json::to_value(&record).ok(),
        );
        self.records.lock().push(record);

        let is_first = {
            let mut first = self.first.lock();
            if first.is_none() {
                *first = Some(err);
                true
            } else {
                false
            }
        };

        if is_first {
            let reason = "first failure recorded";
            if self.mode.halts_submission() {
                self.halt.cancel(reason);
            }
            if self.mode.aborts_in_flight() {
                self.abort.cancel(reason);
            }
        }
        is_first
    }

    /// Returns true if any failure was recorded.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.records.lock().is_empty()
    }

    /// Returns the number of recorded failures.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns a copy of every failure record in recording order.
    #[must_use]
    pub fn records(&self) -> Vec<FailureRecord> {
        self.records.lock().clone()
    }

    /// Takes the first recorded error, leaving the records in place.
    pub fn take_first(&self) -> Option<PipelineError> {
        self.first.lock().take()
    }

    /// Returns true once submissions should stop.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halt.is_cancelled()
    }

    /// Resolves once submissions should stop.
    pub async fn halted(&self) {
        self.halt.cancelled().await;
    }

    /// Returns the token that is cancelled when accepted work must stop.
    #[must_use]
    pub fn abort_token(&self) -> Arc<CancellationToken> {
        self.abort.clone()
    }
}

impl fmt::Debug for FailureLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureLog")
            .field("mode", &self.mode)
            .field("failures", &self.failure_count())
            .field("halted", &self.is_halted())
            .field("aborted", &self.abort.is_cancelled())
            .finish_non_exhaustive()
    }
}
