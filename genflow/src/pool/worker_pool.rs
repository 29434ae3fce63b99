//! Bounded worker pool backing every stage.

use super::metrics::{StageMetrics, StageMetricsSnapshot};
use crate::cancellation::{CancellationToken, TaskGroup};
use crate::core::StageKind;
use crate::errors::{ConfigError, PipelineError};
use crate::pipeline::{FailureLog, StageHandle};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Shape of one pool: which stage it serves and how wide it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSpec {
    /// The stage this pool runs.
    pub stage: StageKind,
    /// Maximum concurrent executions.
    pub concurrency: usize,
    /// Maximum queued items before `submit` suspends.
    pub queue_capacity: usize,
}

impl PoolSpec {
    /// Creates a spec whose queue capacity equals its concurrency.
    #[must_use]
    pub const fn new(stage: StageKind, concurrency: usize) -> Self {
        Self {
            stage,
            concurrency,
            queue_capacity: concurrency,
        }
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}

type SharedReceiver<T> = Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>;

/// Runs up to `concurrency` executions of one unit of work drawn from a
/// bounded queue.
///
/// Workers share the receiving end of the queue, so an item is taken only
/// when a worker is free and the queue holds at most `queue_capacity`
/// items on top of the ones being worked on. Failed work is recorded in
/// the shared [`FailureLog`]; the failure is recorded before the worker
/// takes its next item.
pub struct WorkerPool<T> {
    spec: PoolSpec,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    abort: Arc<CancellationToken>,
    metrics: Arc<StageMetrics>,
    done: watch::Receiver<bool>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Starts the workers.
    ///
    /// `abort` is shared with whatever else must stop on a hard abort;
    /// cancelling it makes the pool discard its queue.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the concurrency or queue capacity
    /// is zero.
    pub fn spawn<F, Fut>(
        spec: PoolSpec,
        failures: Arc<FailureLog>,
        abort: Arc<CancellationToken>,
        work: F,
    ) -> Result<Self, PipelineError>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        if spec.concurrency == 0 {
            return Err(ConfigError::NonPositive {
                field: "concurrency",
            }
            .into());
        }
        if spec.queue_capacity == 0 {
            return Err(ConfigError::NonPositive {
                field: "queue_capacity",
            }
            .into());
        }

        let (tx, rx) = mpsc::channel(spec.queue_capacity);
        let receiver: SharedReceiver<T> = Arc::new(tokio::sync::Mutex::new(rx));
        let metrics = Arc::new(StageMetrics::default());
        let work = Arc::new(work);
        let workers = TaskGroup::new();

        for index in 0..spec.concurrency {
            workers.spawn(
                format!("{}-worker-{index}", spec.stage),
                run_worker(
                    spec.stage,
                    receiver.clone(),
                    work.clone(),
                    failures.clone(),
                    abort.clone(),
                    metrics.clone(),
                ),
            );
        }

        let (done_tx, done_rx) = watch::channel(false);
        let stage = spec.stage;
        tokio::spawn(async move {
            for failure in workers.join_all().await {
                failures.record(PipelineError::Internal {
                    stage,
                    message: format!("{}: {}", failure.task, failure.message),
                });
            }
            debug!(stage = %stage, "Stage finished");
            done_tx.send_replace(true);
        });

        debug!(
            stage = %spec.stage,
            concurrency = spec.concurrency,
            queue_capacity = spec.queue_capacity,
            "Stage started"
        );

        Ok(Self {
            spec,
            sender: Mutex::new(Some(tx)),
            abort,
            metrics,
            done: done_rx,
        })
    }

    /// Enqueues an item, suspending while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Closed`] if the pool was closed or aborted,
    /// including while this call was suspended.
    pub async fn submit(&self, item: T) -> Result<(), PipelineError> {
        let closed = PipelineError::Closed {
            stage: self.spec.stage,
        };
        let Some(sender) = self.sender.lock().clone() else {
            return Err(closed);
        };
        if self.abort.is_cancelled() {
            return Err(closed);
        }

        match sender.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => return Err(closed),
            Err(TrySendError::Full(item)) => {
                self.metrics.record_blocked();
                let sent = tokio::select! {
                    biased;
                    () = self.abort.cancelled() => false,
                    result = sender.send(item) => result.is_ok(),
                };
                if !sent {
                    return Err(closed);
                }
            }
        }
        self.metrics.record_submitted();
        Ok(())
    }

    /// Signals that no more items will be submitted. Idempotent.
    ///
    /// Queued items are still processed.
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            debug!(stage = %self.spec.stage, "Stage closed");
        }
    }

    /// Returns true once `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Hard stop: releases suspended submitters and discards queued items.
    ///
    /// Cancels the abort token the pool was spawned with.
    pub fn abort(&self, reason: impl Into<String>) {
        if self.abort.cancel(reason) {
            warn!(stage = %self.spec.stage, "Stage aborted");
        }
        self.close();
    }

    /// Returns true once the abort token was cancelled.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Resolves once every worker has exited.
    ///
    /// Workers exit after `close` once the queue is empty, or after an
    /// abort. Any number of callers may wait.
    pub async fn completion(&self) {
        let mut done = self.done.clone();
        // A dropped sender means the supervisor is gone; nothing left to wait for.
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Returns true once the pool has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Returns the pool's shape.
    #[must_use]
    pub fn spec(&self) -> PoolSpec {
        self.spec
    }

    /// Returns the live counters.
    #[must_use]
    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Returns a copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StageMetricsSnapshot {
        self.metrics.snapshot(
            self.spec.stage,
            self.spec.concurrency,
            self.spec.queue_capacity,
        )
    }
}

#[async_trait]
impl<T: Send + 'static> StageHandle for WorkerPool<T> {
    fn name(&self) -> &str {
        self.spec.stage.as_str()
    }

    fn close(&self) {
        Self::close(self);
    }

    async fn completion(&self) {
        Self::completion(self).await;
    }
}

impl<T> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("spec", &self.spec)
            .field("closed", &self.sender.lock().is_none())
            .field("finished", &*self.done.borrow())
            .finish_non_exhaustive()
    }
}

async fn run_worker<T, F, Fut>(
    stage: StageKind,
    receiver: SharedReceiver<T>,
    work: Arc<F>,
    failures: Arc<FailureLog>,
    abort: Arc<CancellationToken>,
    metrics: Arc<StageMetrics>,
) where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            if abort.is_cancelled() {
                None
            } else {
                tokio::select! {
                    biased;
                    () = abort.cancelled() => None,
                    item = rx.recv() => item,
                }
            }
        };
        let Some(item) = next else {
            break;
        };

        metrics.record_started();
        let result = match AssertUnwindSafe((*work)(item)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(PipelineError::Internal {
                stage,
                message: format!("worker panicked: {}", panic_message(panic.as_ref())),
            }),
        };
        metrics.record_finished(result.is_ok());
        if let Err(err) = result {
            failures.record(err);
        }
    }

    if abort.is_cancelled() {
        let mut rx = receiver.lock().await;
        rx.close();
        while let Ok(_discarded) = rx.try_recv() {
            metrics.record_discarded();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoOpEventSink;
    use crate::pipeline::FailureMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio_test::{assert_pending, assert_ready};

    fn failure_log(mode: FailureMode) -> Arc<FailureLog> {
        Arc::new(FailureLog::new(mode, Arc::new(NoOpEventSink)))
    }

    async fn wait_for_in_flight<T: Send + 'static>(pool: &WorkerPool<T>, n: usize) {
        while pool.metrics().in_flight() < n {
            tokio::task::yield_now().await;
        }
    }

    fn gated_pool(
        spec: PoolSpec,
        failures: Arc<FailureLog>,
        gate: Arc<Semaphore>,
        done: Arc<AtomicUsize>,
    ) -> WorkerPool<u32> {
        WorkerPool::spawn(
            spec,
            failures,
            Arc::new(CancellationToken::new()),
            move |_item: u32| {
                let gate = gate.clone();
                let done = done.clone();
                async move {
                    gate.acquire().await.unwrap().forget();
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_processes_everything_after_close() {
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = processed.clone();
        let pool = WorkerPool::spawn(
            PoolSpec::new(StageKind::Fetch, 3),
            failure_log(FailureMode::FailFast),
            Arc::new(CancellationToken::new()),
            move |_item: u32| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .unwrap();

        for i in 0..20 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.completion().await;

        assert!(pool.is_finished());
        assert_eq!(processed.load(Ordering::SeqCst), 20);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.submitted, 20);
        assert_eq!(snapshot.completed, 20);
        assert_eq!(snapshot.discarded, 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let result = WorkerPool::spawn(
            PoolSpec::new(StageKind::Transform, 0),
            failure_log(FailureMode::FailFast),
            Arc::new(CancellationToken::new()),
            |_item: u32| async { Ok(()) },
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_third_submit_waits_for_space() {
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let pool = gated_pool(
            PoolSpec::new(StageKind::Fetch, 1).with_queue_capacity(1),
            failure_log(FailureMode::FailFast),
            gate.clone(),
            done.clone(),
        );

        pool.submit(1).await.unwrap();
        wait_for_in_flight(&pool, 1).await;
        pool.submit(2).await.unwrap();

        let mut third = tokio_test::task::spawn(pool.submit(3));
        assert_pending!(third.poll());
        assert_pending!(third.poll());

        gate.add_permits(1);
        while !third.is_woken() {
            tokio::task::yield_now().await;
        }
        assert_ready!(third.poll()).unwrap();
        drop(third);

        gate.add_permits(2);
        pool.close();
        pool.completion().await;

        assert_eq!(done.load(Ordering::SeqCst), 3);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.blocked_submits, 1);
        assert_eq!(snapshot.peak_in_flight, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_ceiling() {
        let current = Arc::new(AtomicUsize::new(0));
        let work_current = current.clone();
        let pool = WorkerPool::spawn(
            PoolSpec::new(StageKind::Transform, 3),
            failure_log(FailureMode::FailFast),
            Arc::new(CancellationToken::new()),
            move |_item: u32| {
                let current = work_current.clone();
                async move {
                    current.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .unwrap();

        for i in 0..30 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.completion().await;

        let snapshot = pool.snapshot();
        assert!(snapshot.peak_in_flight <= 3);
        assert!(snapshot.peak_in_flight >= 1);
        assert_eq!(snapshot.completed, 30);
        assert_eq!(current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submit_after_close_is_rejected() {
        let pool = WorkerPool::spawn(
            PoolSpec::new(StageKind::Persist, 1),
            failure_log(FailureMode::FailFast),
            Arc::new(CancellationToken::new()),
            |_item: u32| async { Ok(()) },
        )
        .unwrap();

        pool.close();
        pool.close();
        let err = pool.submit(1).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Closed {
                stage: StageKind::Persist
            }
        ));
        pool.completion().await;
    }

    #[tokio::test]
    async fn test_completion_has_many_waiters() {
        let pool = Arc::new(
            WorkerPool::spawn(
                PoolSpec::new(StageKind::Fetch, 2),
                failure_log(FailureMode::FailFast),
                Arc::new(CancellationToken::new()),
                |_item: u32| async { Ok(()) },
            )
            .unwrap(),
        );

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.completion().await })
            })
            .collect();

        pool.submit(1).await.unwrap();
        pool.close();
        for waiter in waiters {
            waiter.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_failures_are_recorded() {
        let failures = failure_log(FailureMode::ContinueOnFailure);
        let pool = WorkerPool::spawn(
            PoolSpec::new(StageKind::Fetch, 2),
            failures.clone(),
            Arc::new(CancellationToken::new()),
            |item: u32| async move {
                if item % 2 == 0 {
                    Err(PipelineError::read(
                        crate::core::SourceItem::new(item.to_string()),
                        anyhow::anyhow!("even"),
                    ))
                } else {
                    Ok(())
                }
            },
        )
        .unwrap();

        for i in 0..6 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.completion().await;

        assert_eq!(failures.failure_count(), 3);
        assert_eq!(pool.snapshot().failed, 3);
        assert_eq!(pool.snapshot().completed, 3);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let failures = failure_log(FailureMode::ContinueOnFailure);
        let pool = WorkerPool::spawn(
            PoolSpec::new(StageKind::Transform, 1),
            failures.clone(),
            Arc::new(CancellationToken::new()),
            |item: u32| async move {
                assert!(item != 1, "bad item");
                Ok(())
            },
        )
        .unwrap();

        for i in 0..3 {
            pool.submit(i).await.unwrap();
        }
        pool.close();
        pool.completion().await;

        assert_eq!(pool.snapshot().completed, 2);
        let first = failures.take_first().unwrap();
        assert!(matches!(
            first,
            PipelineError::Internal {
                stage: StageKind::Transform,
                ..
            }
        ));
        assert!(first.to_string().contains("bad item"));
    }

    #[tokio::test]
    async fn test_abort_discards_queue_and_releases_submitters() {
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let pool = gated_pool(
            PoolSpec::new(StageKind::Fetch, 1).with_queue_capacity(2),
            failure_log(FailureMode::Abort),
            gate.clone(),
            done.clone(),
        );

        pool.submit(1).await.unwrap();
        wait_for_in_flight(&pool, 1).await;
        pool.submit(2).await.unwrap();
        pool.submit(3).await.unwrap();

        let mut blocked = tokio_test::task::spawn(pool.submit(4));
        assert_pending!(blocked.poll());

        pool.abort("test abort");
        assert!(blocked.is_woken());
        assert!(matches!(
            assert_ready!(blocked.poll()),
            Err(PipelineError::Closed { .. })
        ));
        drop(blocked);

        gate.add_permits(1);
        pool.completion().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.discarded, 2);
        assert!(pool.submit(5).await.is_err());
    }
}
