//! Cascading completion between stages.

use crate::cancellation::{TaskFailure, TaskGroup};
use crate::events::{self, EventSink, NoOpEventSink};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The part of a stage the coordinator needs.
#[async_trait]
pub trait StageHandle: Send + Sync {
    /// Returns the stage name.
    fn name(&self) -> &str;

    /// Signals that no more input is coming.
    fn close(&self);

    /// Resolves once the stage has processed everything it accepted.
    async fn completion(&self);
}

/// Propagates "no more input" downstream.
///
/// Each link closes its downstream stage only after the upstream stage has
/// completed. Overall completion is the completion of the last stage
/// registered with [`CompletionCoordinator::chain`] or
/// [`CompletionCoordinator::with_tail`].
pub struct CompletionCoordinator {
    links: Vec<(Arc<dyn StageHandle>, Arc<dyn StageHandle>)>,
    tail: Option<Arc<dyn StageHandle>>,
    events: Arc<dyn EventSink>,
    tasks: TaskGroup,
}

impl Default for CompletionCoordinator {
    fn default() -> Self {
        Self::new(Arc::new(NoOpEventSink))
    }
}

impl CompletionCoordinator {
    /// Creates a coordinator without links.
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            links: Vec::new(),
            tail: None,
            events,
            tasks: TaskGroup::new(),
        }
    }

    /// Links consecutive stages and makes the last one the tail.
    #[must_use]
    pub fn chain(stages: Vec<Arc<dyn StageHandle>>, events: Arc<dyn EventSink>) -> Self {
        let mut coordinator = Self::new(events);
        for pair in stages.windows(2) {
            coordinator = coordinator.link(pair[0].clone(), pair[1].clone());
        }
        coordinator.tail = stages.last().cloned();
        coordinator
    }

    /// Adds a link: `downstream` is closed once `upstream` completes.
    #[must_use]
    pub fn link(mut self, upstream: Arc<dyn StageHandle>, downstream: Arc<dyn StageHandle>) -> Self {
        self.links.push((upstream, downstream));
        self
    }

    /// Sets the stage whose completion is the overall completion.
    #[must_use]
    pub fn with_tail(mut self, tail: Arc<dyn StageHandle>) -> Self {
        self.tail = Some(tail);
        self
    }

    /// Returns the number of links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Spawns one watcher task per link.
    pub fn start(&self) {
        for (upstream, downstream) in &self.links {
            let upstream = upstream.clone();
            let downstream = downstream.clone();
            let events = self.events.clone();
            let name = format!("link-{}-{}", upstream.name(), downstream.name());
            self.tasks.spawn(name, async move {
                upstream.completion().await;
                debug!(
                    upstream = upstream.name(),
                    downstream = downstream.name(),
                    "Upstream completed, closing downstream"
                );
                downstream.close();
                events
                    .emit(
                        events::STAGE_CLOSED,
                        Some(serde_json::json!({
                            "stage": downstream.name(),
                            "after": upstream.name(),
                        })),
                    )
                    .await;
            });
        }
    }

    /// Waits for the tail stage and every link watcher.
    ///
    /// Returns the watchers that did not finish normally.
    pub async fn completion(&self) -> Vec<TaskFailure> {
        if let Some(tail) = &self.tail {
            tail.completion().await;
        }
        self.tasks.join_all().await
    }
}

impl std::fmt::Debug for CompletionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let links: Vec<String> = self
            .links
            .iter()
            .map(|(up, down)| format!("{} -> {}", up.name(), down.name()))
            .collect();
        f.debug_struct("CompletionCoordinator")
            .field("links", &links)
            .field("tail", &self.tail.as_ref().map(|t| t.name().to_string()))
            .finish_non_exhaustive()
    }
}
