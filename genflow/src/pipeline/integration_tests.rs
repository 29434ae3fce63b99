//! End-to-end tests for pipeline runs over in-memory collaborators.

#[cfg(test)]
mod tests {
    use crate::config::PipelineConfig;
    use crate::core::{RunState, SourceItem, StageKind};
    use crate::errors::PipelineError;
    use crate::events;
    use crate::pipeline::FailureMode;
    use crate::testing::{MemorySink, MemorySource, SplitTransform, TestPipeline};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn three_sources() -> MemorySource {
        MemorySource::new()
            .with_source("alpha", "one two three")
            .with_source("beta", "four five")
            .with_source("gamma", "six")
    }

    fn five_sources() -> MemorySource {
        (1..=5).fold(MemorySource::new(), |source, i| {
            source.with_source(format!("s{i}"), format!("x{i} y{i}"))
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_artifact_is_persisted_in_order() {
        let fixture = TestPipeline::with_source(
            three_sources().with_jitter(Duration::from_millis(3)),
            PipelineConfig::default(),
        )
        .unwrap();

        fixture
            .pipeline
            .generate(["alpha", "beta", "gamma"])
            .await
            .unwrap();

        for (item, text) in [("alpha", "one two three"), ("beta", "four five"), ("gamma", "six")] {
            assert_eq!(
                fixture.sink.written_with_prefix(&format!("{item}/")),
                SplitTransform::expected(item, text)
            );
        }
        assert_eq!(fixture.sink.len(), 6);
    }

    #[tokio::test]
    async fn test_run_report_on_success() {
        let fixture =
            TestPipeline::with_source(three_sources(), PipelineConfig::default()).unwrap();

        let report = fixture
            .pipeline
            .run(["alpha", "beta", "gamma"])
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.items_submitted, 3);
        assert_eq!(report.items_skipped, 0);
        assert_eq!(report.artifacts_persisted, 6);
        assert!(report.failures.is_empty());
        assert_eq!(report.stages.len(), 3);

        let persist = report.stage(StageKind::Persist).unwrap();
        assert_eq!(persist.submitted, 3);
        assert_eq!(persist.completed, 3);
    }

    #[tokio::test]
    async fn test_events_follow_the_run() {
        let fixture =
            TestPipeline::with_source(three_sources(), PipelineConfig::default()).unwrap();

        fixture.pipeline.generate(["alpha", "beta"]).await.unwrap();

        let sink = &fixture.events;
        assert_eq!(sink.count_of(events::PIPELINE_STARTED), 1);
        assert_eq!(sink.count_of(events::PIPELINE_STATE_CHANGED), 3);
        assert_eq!(sink.count_of(events::STAGE_CLOSED), 3);
        assert_eq!(sink.count_of(events::ARTIFACT_PERSISTED), 5);
        assert_eq!(sink.count_of(events::PIPELINE_COMPLETED), 1);
        assert_eq!(sink.count_of(events::PIPELINE_FAILED), 0);

        let transitions: Vec<_> = sink
            .payloads_of(events::PIPELINE_STATE_CHANGED)
            .into_iter()
            .flatten()
            .map(|p| p["to"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(transitions, vec!["submitting", "draining", "completed"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transform_concurrency_one() {
        let source = MemorySource::new().with_generated(8, 2);
        let items = source.items();
        let fixture = TestPipeline::new(
            source,
            SplitTransform::new().with_call_delay(Duration::from_millis(5)),
            MemorySink::new(),
            PipelineConfig::default().with_transform_concurrency(1),
        )
        .unwrap();

        let report = fixture.pipeline.run(items).await.unwrap();

        assert!(report.is_success());
        assert_eq!(fixture.transform.probe().peak(), 1);
        assert_eq!(fixture.transform.calls(), 8);
        assert_eq!(report.stage(StageKind::Transform).unwrap().peak_in_flight, 1);
        assert_eq!(fixture.sink.len(), 16);
    }

    #[tokio::test]
    async fn test_empty_sequence_writes_nothing() {
        let source = MemorySource::new()
            .with_source("empty", "")
            .with_source("full", "a b");
        let fixture = TestPipeline::with_source(source, PipelineConfig::default()).unwrap();

        let report = fixture.pipeline.run(["empty", "full"]).await.unwrap();

        assert!(report.is_success());
        assert!(fixture.sink.written_with_prefix("empty/").is_empty());
        assert_eq!(fixture.sink.len(), 2);
        assert_eq!(report.stage(StageKind::Persist).unwrap().completed, 2);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_submission() {
        let fixture = TestPipeline::with_source(
            five_sources().failing("s3"),
            PipelineConfig::default()
                .with_fetch_concurrency(1)
                .with_queue_capacity(StageKind::Fetch, 1),
        )
        .unwrap();

        let err = fixture
            .pipeline
            .generate(["s1", "s2", "s3", "s4", "s5"])
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Read { .. }));
        assert_eq!(err.item(), Some(&SourceItem::new("s3")));
        assert!(!fixture.source.was_read("s5"));
        // Accepted items before the failure still drain.
        assert_eq!(fixture.sink.written_with_prefix("s1/").len(), 2);
        assert_eq!(fixture.sink.written_with_prefix("s2/").len(), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_report() {
        let fixture = TestPipeline::with_source(
            five_sources().failing("s3"),
            PipelineConfig::default()
                .with_fetch_concurrency(1)
                .with_queue_capacity(StageKind::Fetch, 1),
        )
        .unwrap();

        let report = fixture
            .pipeline
            .run(["s1", "s2", "s3", "s4", "s5"])
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Failed);
        assert!(report.items_skipped >= 1);
        assert_eq!(report.items_submitted + report.items_skipped, 5);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item, Some(SourceItem::new("s3")));
        assert_eq!(report.failures[0].stage, Some(StageKind::Fetch));
        assert_eq!(fixture.events.count_of(events::PIPELINE_FAILED), 1);
        assert_eq!(fixture.events.count_of(events::ITEM_FAILED), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_default_config_caps_every_stage() {
        let source = MemorySource::new()
            .with_generated(40, 3)
            .with_delay(Duration::from_millis(2))
            .with_jitter(Duration::from_millis(2));
        let items = source.items();
        let fixture = TestPipeline::new(
            source,
            SplitTransform::new().with_call_delay(Duration::from_millis(2)),
            MemorySink::new().with_delay(Duration::from_millis(1)),
            PipelineConfig::default(),
        )
        .unwrap();

        let report = fixture.pipeline.run(items).await.unwrap();

        assert!(report.is_success());
        assert_eq!(fixture.sink.len(), 120);
        assert!(fixture.source.probe().peak() <= 10);
        assert!(fixture.transform.probe().peak() <= 10);
        assert!(fixture.sink.probe().peak() <= 10);
        for stage in &report.stages {
            assert_eq!(stage.concurrency, 10);
            assert!(stage.peak_in_flight <= 10);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abort_discards_queued_items() {
        let source = (1..=8).fold(MemorySource::new(), |source, i| {
            source.with_source(format!("s{i}"), "a b")
        });
        let fixture = TestPipeline::with_source(
            source.failing("s1"),
            PipelineConfig::default()
                .with_fetch_concurrency(1)
                .with_queue_capacity(StageKind::Fetch, 5)
                .with_failure_mode(FailureMode::Abort),
        )
        .unwrap();

        let items: Vec<String> = (1..=8).map(|i| format!("s{i}")).collect();
        let report = fixture.pipeline.run(items).await.unwrap();

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(fixture.source.reads().len(), 1);
        assert!(fixture.sink.is_empty());
        assert!(report.items_skipped >= 2);

        let fetch = report.stage(StageKind::Fetch).unwrap();
        assert_eq!(fetch.started, 1);
        assert_eq!(fetch.discarded, fetch.submitted - 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abort_stops_draining_between_artifacts() {
        let source = MemorySource::new()
            .with_source("long", "a b c d e f g h i j")
            .with_source("bad", "x");
        let fixture = TestPipeline::new(
            source.failing("bad"),
            SplitTransform::new().with_step_delay(Duration::from_millis(10)),
            MemorySink::new(),
            PipelineConfig::default().with_failure_mode(FailureMode::Abort),
        )
        .unwrap();

        let err = fixture.pipeline.generate(["long", "bad"]).await.unwrap_err();

        assert!(matches!(err, PipelineError::Read { .. }));
        assert!(fixture.sink.len() < 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_continue_on_failure_collects_everything() {
        let fixture = TestPipeline::new(
            five_sources().failing("s2").failing("s4"),
            SplitTransform::new().failing("s5"),
            MemorySink::new(),
            PipelineConfig::default().with_failure_mode(FailureMode::ContinueOnFailure),
        )
        .unwrap();

        let report = fixture
            .pipeline
            .run(["s1", "s2", "s3", "s4", "s5"])
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.items_submitted, 5);
        assert_eq!(report.failures.len(), 3);
        let mut failed: Vec<_> = report
            .failures
            .iter()
            .filter_map(|f| f.item.as_ref().map(ToString::to_string))
            .collect();
        failed.sort();
        assert_eq!(failed, vec!["s2", "s4", "s5"]);
        assert_eq!(
            fixture.written_names(),
            vec!["s1/0-x1", "s1/1-y1", "s3/0-x3", "s3/1-y3"]
        );
        assert!(report.into_result().is_err());
    }

    #[tokio::test]
    async fn test_error_mid_sequence_is_transform_error() {
        let fixture = TestPipeline::new(
            MemorySource::new().with_source("a", "p q r s"),
            SplitTransform::new().failing_at("a", 2),
            MemorySink::new(),
            PipelineConfig::default(),
        )
        .unwrap();

        let err = fixture.pipeline.generate(["a"]).await.unwrap_err();

        assert!(matches!(err, PipelineError::Transform { .. }));
        assert_eq!(err.stage(), Some(StageKind::Transform));
        assert_eq!(
            fixture.written_names(),
            vec!["a/0-p".to_string(), "a/1-q".to_string()]
        );
    }

    #[tokio::test]
    async fn test_transform_failure() {
        let fixture = TestPipeline::new(
            MemorySource::new().with_source("a", "p"),
            SplitTransform::new().failing("a"),
            MemorySink::new(),
            PipelineConfig::default(),
        )
        .unwrap();

        let err = fixture.pipeline.generate(["a"]).await.unwrap_err();

        assert!(matches!(err, PipelineError::Transform { .. }));
        assert!(fixture.sink.is_empty());
    }

    #[tokio::test]
    async fn test_write_error_names_artifact() {
        let fixture = TestPipeline::new(
            MemorySource::new().with_source("b", "x y z"),
            SplitTransform::new(),
            MemorySink::new().failing("b/1-y"),
            PipelineConfig::default(),
        )
        .unwrap();

        let err = fixture.pipeline.generate(["b"]).await.unwrap_err();

        assert_eq!(err.error_type(), "WriteError");
        assert_eq!(err.artifact(), Some("b/1-y"));
        assert_eq!(err.item(), Some(&SourceItem::new("b")));
        assert_eq!(fixture.written_names(), vec!["b/0-x".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_source_fails_read() {
        let fixture =
            TestPipeline::with_source(MemorySource::new(), PipelineConfig::default()).unwrap();

        let err = fixture.pipeline.generate(["missing"]).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_no_items_completes() {
        let fixture =
            TestPipeline::with_source(MemorySource::new(), PipelineConfig::default()).unwrap();

        let report = fixture.pipeline.run(Vec::<String>::new()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.items_submitted, 0);
    }

    #[tokio::test]
    async fn test_pipeline_can_run_twice() {
        let fixture =
            TestPipeline::with_source(three_sources(), PipelineConfig::default()).unwrap();

        fixture.pipeline.generate(["gamma"]).await.unwrap();
        fixture.pipeline.generate(["gamma", "beta"]).await.unwrap();

        assert_eq!(fixture.sink.len(), 4);
        assert_eq!(fixture.events.count_of(events::PIPELINE_COMPLETED), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_run_stops_every_stage() {
        let source = MemorySource::new()
            .with_generated(6, 2)
            .with_delay(Duration::from_millis(30));
        let items = source.items();
        let fixture = TestPipeline::with_source(
            source,
            PipelineConfig::default()
                .with_fetch_concurrency(1)
                .with_queue_capacity(StageKind::Fetch, 1),
        )
        .unwrap();
        let metrics = tokio::runtime::Handle::current().metrics();
        let before = metrics.num_alive_tasks();

        let outcome =
            tokio::time::timeout(Duration::from_millis(5), fixture.pipeline.generate(items)).await;
        assert!(outcome.is_err());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while metrics.num_alive_tasks() > before && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(metrics.num_alive_tasks(), before);
        assert!(fixture.source.reads().len() < 6);
    }

    #[tokio::test]
    async fn test_fail_fast_does_not_pull_remaining_input() {
        let fixture = TestPipeline::with_source(
            MemorySource::new(),
            PipelineConfig::default()
                .with_fetch_concurrency(1)
                .with_queue_capacity(StageKind::Fetch, 1),
        )
        .unwrap();

        // Endless input; every item is unknown to the source.
        let mut next = 0_usize;
        let items = std::iter::from_fn(move || {
            next += 1;
            Some(format!("missing-{next}"))
        });

        let report = tokio::time::timeout(Duration::from_secs(5), fixture.pipeline.run(items))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.items_skipped, 1);
        assert!(report.items_submitted >= 1);
        assert_eq!(report.failures[0].item, Some(SourceItem::new("missing-1")));
    }
}
