//! Pipeline orchestration.
//!
//! This module provides:
//! - The [`Pipeline`] orchestrator and its [`PipelineBuilder`]
//! - The [`CompletionCoordinator`] that cascades "no more input" downstream
//! - Failure recording and the [`FailureMode`] policy
//! - The [`RunReport`] produced by every run

mod builder;
mod coordinator;
mod failure;
mod orchestrator;
mod report;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use coordinator::{CompletionCoordinator, StageHandle};
pub use failure::{FailureLog, FailureMode, FailureRecord};
pub use orchestrator::Pipeline;
pub use report::RunReport;
