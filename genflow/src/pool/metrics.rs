//! Per-stage counters.

use crate::core::StageKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters for one worker pool.
#[derive(Debug, Default)]
pub struct StageMetrics {
    /// Items accepted into the queue.
    submitted: AtomicU64,
    /// Items a worker started on.
    started: AtomicU64,
    /// Items whose work finished successfully.
    completed: AtomicU64,
    /// Items whose work failed.
    failed: AtomicU64,
    /// Items dropped from the queue after an abort.
    discarded: AtomicU64,
    /// Submissions that had to wait for queue space.
    blocked_submits: AtomicU64,
    /// Items currently being worked on.
    in_flight: AtomicUsize,
    /// High-water mark of `in_flight`.
    peak_in_flight: AtomicUsize,
}

impl StageMetrics {
    /// Records an item accepted into the queue.
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a submission that found the queue full.
    pub fn record_blocked(&self) {
        self.blocked_submits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker starting on an item.
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    /// Records a worker finishing an item.
    pub fn record_finished(&self, success: bool) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a queued item dropped without being worked on.
    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of accepted items.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Returns the number of successfully finished items.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Returns the number of failed items.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Returns the number of items currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Returns the most items ever in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Takes a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(
        &self,
        stage: StageKind,
        concurrency: usize,
        queue_capacity: usize,
    ) -> StageMetricsSnapshot {
        StageMetricsSnapshot {
            stage,
            concurrency,
            queue_capacity,
            submitted: self.submitted(),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed(),
            failed: self.failed(),
            discarded: self.discarded.load(Ordering::Relaxed),
            blocked_submits: self.blocked_submits.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight(),
        }
    }
}

/// Serializable copy of [`StageMetrics`] for run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetricsSnapshot {
    /// The stage these numbers belong to.
    pub stage: StageKind,
    /// Configured worker count.
    pub concurrency: usize,
    /// Configured queue capacity.
    pub queue_capacity: usize,
    /// Items accepted into the queue.
    pub submitted: u64,
    /// Items a worker started on.
    pub started: u64,
    /// Items finished successfully.
    pub completed: u64,
    /// Items that failed.
    pub failed: u64,
    /// Items discarded after an abort.
    pub discarded: u64,
    /// Submissions that waited for queue space.
    pub blocked_submits: u64,
    /// Most items in flight at once.
    pub peak_in_flight: usize,
}
