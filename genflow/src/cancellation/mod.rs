//! Cancellation and task supervision utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative, awaitable cancellation
//! - TaskGroup for joining a set of worker tasks and surfacing panics

mod task_group;
mod token;

pub use task_group::{TaskFailure, TaskGroup};
pub use token::CancellationToken;
