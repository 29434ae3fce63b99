//! Stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The three stages of a generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Reads source content by identifier.
    Fetch,
    /// Turns content into a lazy artifact sequence.
    Transform,
    /// Drains artifact sequences into the sink.
    Persist,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [Self; 3] = [Self::Fetch, Self::Transform, Self::Persist];

    /// Returns the stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Transform => "transform",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle of a single pipeline run.
///
/// `Idle -> Submitting -> Draining -> {Completed | Failed}`. A terminal state
/// is only entered once every stage has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing has been submitted yet.
    #[default]
    Idle,
    /// Source items are being handed to the fetch stage.
    Submitting,
    /// Submission ended; stages are working through accepted items.
    Draining,
    /// Every artifact was persisted.
    Completed,
    /// At least one failure was recorded.
    Failed,
}

/// Error returned for an illegal run state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid run state transition from {from} to {to}")]
pub struct InvalidTransition {
    /// The current state.
    pub from: RunState,
    /// The requested state.
    pub to: RunState,
}

impl RunState {
    /// Returns true if the run has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Submitting)
                | (Self::Submitting, Self::Draining)
                | (Self::Draining, Self::Completed | Self::Failed)
        )
    }

    /// Moves to `next`, rejecting illegal transitions.
    pub fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Submitting => write!(f, "submitting"),
            Self::Draining => write!(f, "draining"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
