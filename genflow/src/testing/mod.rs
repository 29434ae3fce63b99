//! Testing utilities for genflow pipelines.
//!
//! This module provides:
//! - In-memory source, transform and sink collaborators
//! - A concurrency probe for high-water-mark assertions
//! - A pipeline fixture wiring them together

mod fixtures;
mod mocks;

pub use fixtures::TestPipeline;
pub use mocks::{ConcurrencyProbe, MemorySink, MemorySource, ProbeGuard, SplitTransform};
