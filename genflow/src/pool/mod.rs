//! Bounded worker pools.
//!
//! A [`WorkerPool`] runs a fixed number of workers over a bounded queue and
//! is the execution engine behind every stage.

mod metrics;
mod worker_pool;

pub use metrics::{StageMetrics, StageMetricsSnapshot};
pub use worker_pool::{PoolSpec, WorkerPool};
