//! In-memory collaborators for tests and benchmarks.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{Artifact, ArtifactSequence, RawContent, SourceItem};
use crate::stages::{ArtifactSink, ArtifactTransform, SourceReader};

/// Tracks how many calls are inside a section at once.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    /// Marks entry; the section ends when the guard drops.
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard { probe: self }
    }

    /// Returns how many calls are inside right now.
    #[must_use]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Returns the most calls ever inside at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Leaves the probed section on drop.
#[derive(Debug)]
pub struct ProbeGuard<'a> {
    probe: &'a ConcurrencyProbe,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sleeps for `base` plus up to `jitter` of random extra time.
async fn pause(base: Duration, jitter: Duration) {
    let extra = if jitter.is_zero() {
        Duration::ZERO
    } else {
        let max = u64::try_from(jitter.as_micros()).unwrap_or(u64::MAX);
        Duration::from_micros(rand::thread_rng().gen_range(0..=max))
    };
    let total = base + extra;
    if !total.is_zero() {
        tokio::time::sleep(total).await;
    }
}

/// A source reader backed by a map.
///
/// Unknown items fail to read, as do items marked with
/// [`MemorySource::failing`].
#[derive(Debug, Default)]
pub struct MemorySource {
    contents: HashMap<String, String>,
    failing: HashSet<String>,
    delay: Duration,
    jitter: Duration,
    reads: Mutex<Vec<SourceItem>>,
    probe: ConcurrencyProbe,
}

impl MemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one source.
    #[must_use]
    pub fn with_source(mut self, item: impl Into<String>, text: impl Into<String>) -> Self {
        self.contents.insert(item.into(), text.into());
        self
    }

    /// Adds `count` sources named `item-0`.. each holding `words` words.
    #[must_use]
    pub fn with_generated(mut self, count: usize, words: usize) -> Self {
        for i in 0..count {
            let text = (0..words)
                .map(|w| format!("w{w}"))
                .collect::<Vec<_>>()
                .join(" ");
            self.contents.insert(format!("item-{i}"), text);
        }
        self
    }

    /// Makes reads of `item` fail.
    #[must_use]
    pub fn failing(mut self, item: impl Into<String>) -> Self {
        self.failing.insert(item.into());
        self
    }

    /// Makes every read take at least `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Adds up to `jitter` of random time to every read.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the names of every source, sorted.
    #[must_use]
    pub fn items(&self) -> Vec<String> {
        let mut items: Vec<String> = self.contents.keys().cloned().collect();
        items.sort();
        items
    }

    /// Returns every item a read was started for, in order.
    #[must_use]
    pub fn reads(&self) -> Vec<SourceItem> {
        self.reads.lock().clone()
    }

    /// Returns true if a read of `item` was started.
    #[must_use]
    pub fn was_read(&self, item: &str) -> bool {
        self.reads.lock().iter().any(|r| r.as_str() == item)
    }

    /// Returns the read concurrency probe.
    #[must_use]
    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn read(&self, item: &SourceItem) -> anyhow::Result<String> {
        self.reads.lock().push(item.clone());
        let _guard = self.probe.enter();
        pause(self.delay, self.jitter).await;

        if self.failing.contains(item.as_str()) {
            anyhow::bail!("injected read failure for '{item}'");
        }
        self.contents
            .get(item.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such source: '{item}'"))
    }
}

/// A transform that yields one artifact per whitespace-separated word.
///
/// Artifact names are `<item>/<index>-<word>`; contents are the word. The
/// artifacts are produced lazily as the sequence is pulled.
#[derive(Debug, Default)]
pub struct SplitTransform {
    failing: HashSet<String>,
    fail_at: HashMap<String, usize>,
    call_delay: Duration,
    step_delay: Duration,
    probe: ConcurrencyProbe,
    calls: AtomicUsize,
}

impl SplitTransform {
    /// Creates a transform without delays or failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `transform` itself fail for `item`.
    #[must_use]
    pub fn failing(mut self, item: impl Into<String>) -> Self {
        self.failing.insert(item.into());
        self
    }

    /// Makes the sequence of `item` yield an error at `index`.
    #[must_use]
    pub fn failing_at(mut self, item: impl Into<String>, index: usize) -> Self {
        self.fail_at.insert(item.into(), index);
        self
    }

    /// Makes every `transform` call take at least `delay`.
    #[must_use]
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Makes every sequence step take at least `delay`.
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Returns the probe around `transform` calls.
    #[must_use]
    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }

    /// Returns the number of `transform` calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the artifacts the transform yields for `item` holding `text`.
    #[must_use]
    pub fn expected(item: &str, text: &str) -> Vec<Artifact> {
        text.split_whitespace()
            .enumerate()
            .map(|(index, word)| Artifact::new(format!("{item}/{index}-{word}"), word))
            .collect()
    }
}

#[async_trait]
impl ArtifactTransform for SplitTransform {
    async fn transform(&self, content: RawContent) -> anyhow::Result<ArtifactSequence> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.probe.enter();
        pause(self.call_delay, Duration::ZERO).await;

        let (source, text) = content.into_parts();
        if self.failing.contains(source.as_str()) {
            anyhow::bail!("injected transform failure for '{source}'");
        }

        let artifacts = Self::expected(source.as_str(), &text).into_iter().enumerate();
        let fail_at = self.fail_at.get(source.as_str()).copied();
        let step_delay = self.step_delay;
        let item = source.clone();

        let steps = stream::unfold(artifacts, move |mut artifacts| {
            let item = item.clone();
            async move {
                let (index, artifact) = artifacts.next()?;
                pause(step_delay, Duration::ZERO).await;
                let step = if fail_at == Some(index) {
                    Err(anyhow::anyhow!("injected failure at artifact {index} of '{item}'"))
                } else {
                    Ok(artifact)
                };
                Some((step, artifacts))
            }
        });
        Ok(ArtifactSequence::new(source, steps))
    }
}

/// A sink that keeps every artifact in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    written: Mutex<Vec<Artifact>>,
    by_name: DashMap<String, String>,
    failing: HashSet<String>,
    delay: Duration,
    probe: ConcurrencyProbe,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes writes of the artifact named `name` fail.
    #[must_use]
    pub fn failing(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Makes every write take at least `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns every written artifact in write order.
    #[must_use]
    pub fn written(&self) -> Vec<Artifact> {
        self.written.lock().clone()
    }

    /// Returns the written artifacts whose names start with `prefix`, in
    /// write order.
    #[must_use]
    pub fn written_with_prefix(&self, prefix: &str) -> Vec<Artifact> {
        self.written
            .lock()
            .iter()
            .filter(|a| a.name.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the content written under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Returns the number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.written.lock().len()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.lock().is_empty()
    }

    /// Returns the probe around writes.
    #[must_use]
    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn write(&self, artifact: &Artifact) -> anyhow::Result<()> {
        let _guard = self.probe.enter();
        pause(self.delay, Duration::ZERO).await;

        if self.failing.contains(&artifact.name) {
            anyhow::bail!("injected write failure for '{}'", artifact.name);
        }
        self.by_name
            .insert(artifact.name.clone(), artifact.content.clone());
        self.written.lock().push(artifact.clone());
        Ok(())
    }
}
