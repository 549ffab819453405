//! End-to-end cycle tests against in-memory dependencies.

#[cfg(test)]
mod tests {
    use crate::alerts::{AlertLedger, InMemoryAlertLedger};
    use crate::config::PipelineConfig;
    use crate::core::{Cursor, CycleStage, CycleState};
    use crate::errors::{ErrorClass, ScoringError, SourceError};
    use crate::events::{CollectingEventSink, CYCLE_SKIPPED};
    use crate::pipeline::{
        CursorStore, CycleScheduler, InMemoryCursorStore, JitterStrategy, Pipeline, RetryConfig,
    };
    use crate::store::{InMemoryScoredPaymentStore, ScoredPaymentStore};
    use crate::testing::{
        sample_row, FailingStore, RecordingNotifier, ScriptedScoringBackend, ScriptedSource,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000;

    fn config() -> PipelineConfig {
        PipelineConfig::new().with_retry(
            RetryConfig::new()
                .with_max_attempts(3)
                .with_base_delay_ms(1)
                .with_max_delay_ms(5)
                .with_jitter(JitterStrategy::None),
        )
    }

    struct Harness {
        pipeline: Pipeline,
        source: Arc<ScriptedSource>,
        backend: Arc<ScriptedScoringBackend>,
        store: Arc<dyn ScoredPaymentStore>,
        ledger: Arc<InMemoryAlertLedger>,
        notifier: Arc<RecordingNotifier>,
        events: Arc<CollectingEventSink>,
    }

    impl Harness {
        fn new(source: ScriptedSource, backend: ScriptedScoringBackend) -> Self {
            Self::with_parts(
                source,
                backend,
                Arc::new(InMemoryScoredPaymentStore::new()),
                RecordingNotifier::new(),
            )
        }

        fn with_parts(
            source: ScriptedSource,
            backend: ScriptedScoringBackend,
            store: Arc<dyn ScoredPaymentStore>,
            notifier: RecordingNotifier,
        ) -> Self {
            let source = Arc::new(source);
            let backend = Arc::new(backend);
            let ledger = Arc::new(InMemoryAlertLedger::new());
            let notifier = Arc::new(notifier);
            let events = Arc::new(CollectingEventSink::new());
            let pipeline = Pipeline::builder(config())
                .with_source(source.clone())
                .with_scoring_backend(backend.clone())
                .with_store(store.clone())
                .with_ledger(ledger.clone())
                .with_notifier(notifier.clone())
                .with_event_sink(events.clone())
                .build()
                .unwrap();
            Self {
                pipeline,
                source,
                backend,
                store,
                ledger,
                notifier,
                events,
            }
        }
    }

    fn two_payments() -> ScriptedSource {
        ScriptedSource::with_rows(vec![
            sample_row("T1", T0, 120.0),
            sample_row("T2", T0 + 1_000, 8.5),
        ])
    }

    fn t1_is_fraud() -> ScriptedScoringBackend {
        ScriptedScoringBackend::constant(0.1).with_probability("T1", 0.92)
    }

    #[tokio::test]
    async fn test_cycle_scores_loads_and_alerts() {
        let h = Harness::new(two_payments(), t1_is_fraud());

        let (next, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert!(result.is_completed(), "{}", result.state);
        assert_eq!(next, Cursor::after(T0 + 1_000, "T2"));
        assert_eq!(result.counts.extracted, 2);
        assert_eq!(result.counts.scored, 2);
        assert_eq!(result.counts.flagged, 1);
        assert_eq!(result.counts.loaded, 2);
        assert_eq!(result.counts.alerted, 1);
        assert_eq!(h.notifier.sent_trans_nums(), vec!["T1"]);

        let t1 = h.store.get("T1").await.unwrap().unwrap();
        assert_eq!(t1.fraud_probability, 0.92);
        assert!(t1.fraud_flag);
        assert_eq!(t1.model_version, "xgb-rt");
        assert_eq!(t1.snapshot.amt, 120.0);
        assert_eq!(t1.snapshot.merchant.as_deref(), Some("fraud_Kirlin and Sons"));

        let sent = h.notifier.sent();
        let message = &sent[0];
        assert!(message.subject.contains("T1"));
        assert!(message.body.contains("0.9200"));
        assert!(h.ledger.contains("T1").await.unwrap());
    }

    #[tokio::test]
    async fn test_state_transitions_are_forward_only() {
        let h = Harness::new(two_payments(), t1_is_fraud());
        let (_, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert_eq!(
            result.transitions,
            vec![
                CycleState::Idle,
                CycleState::Extracting,
                CycleState::Transforming,
                CycleState::Scoring,
                CycleState::Loading,
                CycleState::Alerting,
                CycleState::Completed,
            ]
        );
        assert!(result.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_replayed_window_is_idempotent() {
        let h = Harness::new(two_payments(), t1_is_fraud());

        let (_, first) = h.pipeline.run_one_cycle(&Cursor::start()).await;
        let before = h.store.get("T1").await.unwrap().unwrap();

        let (_, replay) = h.pipeline.run_one_cycle(&Cursor::start()).await;
        let after = h.store.get("T1").await.unwrap().unwrap();

        assert!(first.is_completed());
        assert!(replay.is_completed());
        assert_eq!(h.store.count().await.unwrap(), 2);
        assert_eq!(after, before);

        assert_eq!(replay.counts.alerted, 0);
        assert_eq!(replay.counts.already_alerted, 1);
        assert_eq!(h.notifier.sent_trans_nums(), vec!["T1"]);
        assert_eq!(h.ledger.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rescored_row_replaces_previous_score() {
        let h = Harness::new(two_payments(), t1_is_fraud());
        h.pipeline.run_one_cycle(&Cursor::start()).await;

        h.backend.set_probability("T2", 0.75);
        let (_, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        let t2 = h.store.get("T2").await.unwrap().unwrap();
        assert!(t2.fraud_flag);
        assert_eq!(t2.fraud_probability, 0.75);
        assert_eq!(h.store.count().await.unwrap(), 2);
        assert_eq!(result.counts.alerted, 1);
        assert_eq!(h.notifier.sent_trans_nums(), vec!["T1", "T2"]);
    }

    #[tokio::test]
    async fn test_threshold_boundary_is_inclusive() {
        let backend = ScriptedScoringBackend::constant(0.0)
            .with_probability("T1", 0.5)
            .with_probability("T2", 0.499_999);
        let h = Harness::new(two_payments(), backend);

        let (_, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert_eq!(result.counts.flagged, 1);
        assert!(h.store.get("T1").await.unwrap().unwrap().fraud_flag);
        assert!(!h.store.get("T2").await.unwrap().unwrap().fraud_flag);
        assert_eq!(h.notifier.sent_trans_nums(), vec!["T1"]);
    }

    #[tokio::test]
    async fn test_permanent_scoring_failure_writes_nothing() {
        let backend = t1_is_fraud().fail_next(ScoringError::Permanent("401 unauthorized".into()));
        let h = Harness::new(two_payments(), backend);

        let start = Cursor::at(T0 - 10);
        let (next, result) = h.pipeline.run_one_cycle(&start).await;

        assert!(result.is_failed());
        assert_eq!(result.failed_stage(), Some(CycleStage::Score));
        assert_eq!(result.error_class(), Some(ErrorClass::PermanentDependencyError));
        assert_eq!(next, start);
        assert_eq!(h.backend.calls(), 1);
        assert_eq!(h.store.count().await.unwrap(), 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transient_scoring_failure_is_retried() {
        let backend = t1_is_fraud().fail_next(ScoringError::Transient("503".into()));
        let h = Harness::new(two_payments(), backend);

        let (_, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert!(result.is_completed());
        assert_eq!(h.backend.calls(), 2);
        assert_eq!(h.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_scoring_retries_fail_cycle() {
        let backend = t1_is_fraud().always_fail(ScoringError::Transient("503".into()));
        let h = Harness::new(two_payments(), backend);

        let (_, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert_eq!(result.failed_stage(), Some(CycleStage::Score));
        assert_eq!(result.error_class(), Some(ErrorClass::TransientDependencyError));
        assert_eq!(h.backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_source_failure_fails_extract() {
        let source = two_payments().fail_next(SourceError::MalformedResponse("<html>".into()));
        let h = Harness::new(source, t1_is_fraud());

        let (next, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert_eq!(result.failed_stage(), Some(CycleStage::Extract));
        assert_eq!(next, Cursor::start());
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_window_completes() {
        let h = Harness::new(two_payments(), t1_is_fraud());

        let past_everything = Cursor::at(T0 + 60_000);
        let (next, result) = h.pipeline.run_one_cycle(&past_everything).await;

        assert!(result.is_completed());
        assert_eq!(next, past_everything);
        assert_eq!(result.counts.extracted, 0);
        assert_eq!(result.counts.loaded, 0);
        assert_eq!(h.backend.calls(), 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_is_inclusive() {
        let h = Harness::new(two_payments(), t1_is_fraud());

        let (_, result) = h.pipeline.run_one_cycle(&Cursor::at(T0 + 1_000)).await;

        assert_eq!(result.counts.extracted, 1);
        assert!(h.store.get("T2").await.unwrap().is_some());
        assert!(h.store.get("T1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ties_wider_than_window_still_advance() {
        let source = Arc::new(ScriptedSource::with_rows(vec![
            sample_row("A1", T0, 1.0),
            sample_row("A2", T0, 2.0),
            sample_row("A3", T0, 3.0),
            sample_row("B1", T0 + 5_000, 4.0),
        ]));
        let store = Arc::new(InMemoryScoredPaymentStore::new());
        let mut pipeline_config = config();
        pipeline_config.window_size = 2;
        let pipeline = Pipeline::builder(pipeline_config)
            .with_source(source)
            .with_scoring_backend(Arc::new(ScriptedScoringBackend::constant(0.1)))
            .with_store(store.clone())
            .with_ledger(Arc::new(InMemoryAlertLedger::new()))
            .with_notifier(Arc::new(RecordingNotifier::new()))
            .build()
            .unwrap();

        let mut cursor = Cursor::start();
        let mut extracted = Vec::new();
        for _ in 0..5 {
            let (next, result) = pipeline.run_one_cycle(&cursor).await;
            assert!(result.is_completed(), "{}", result.state);
            extracted.push(result.counts.extracted);
            cursor = next;
        }

        assert_eq!(extracted, vec![2, 2, 0, 0, 0]);
        assert_eq!(cursor, Cursor::after(T0 + 5_000, "B1"));
        assert_eq!(store.count().await.unwrap(), 4);
        for trans_num in ["A1", "A2", "A3", "B1"] {
            assert!(store.get(trans_num).await.unwrap().is_some(), "{trans_num} not loaded");
        }
    }

    #[tokio::test]
    async fn test_rejected_and_skipped_records_are_counted() {
        let mut no_amount = sample_row("T3", T0 + 2_000, 1.0);
        no_amount.remove("amt");
        let mut bad_zip = sample_row("T4", T0 + 3_000, 1.0);
        bad_zip.insert("zip".into(), json!("not-a-zip"));

        let source = two_payments();
        source.push_row(no_amount);
        source.push_row(bad_zip);
        let h = Harness::new(source, t1_is_fraud());

        let (next, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert!(result.is_completed());
        assert_eq!(result.counts.rejected, 1);
        assert_eq!(result.counts.extracted, 3);
        assert_eq!(result.counts.skipped, 1);
        assert_eq!(result.counts.loaded, 2);
        // The skipped record is not retried on the next cycle.
        assert_eq!(next, Cursor::after(T0 + 3_000, "T4"));
    }

    #[tokio::test]
    async fn test_duplicate_trans_num_keeps_last_row() {
        let source = two_payments();
        source.push_row(sample_row("T1", T0 + 500, 99.0));
        let h = Harness::new(source, t1_is_fraud());

        let (_, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert_eq!(result.counts.duplicates, 1);
        assert_eq!(result.counts.loaded, 2);
        assert_eq!(h.store.get("T1").await.unwrap().unwrap().snapshot.amt, 99.0);
        assert_eq!(h.notifier.sent_trans_nums(), vec!["T1"]);
    }

    #[tokio::test]
    async fn test_store_failure_fails_load_and_sends_nothing() {
        let store = Arc::new(FailingStore::failing());
        let h = Harness::with_parts(two_payments(), t1_is_fraud(), store.clone(), RecordingNotifier::new());

        let (next, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;
        assert_eq!(result.failed_stage(), Some(CycleStage::Load));
        assert_eq!(result.error_class(), Some(ErrorClass::StoreError));
        assert_eq!(next, Cursor::start());
        assert!(h.notifier.sent().is_empty());

        store.set_failing(false);
        let (next, result) = h.pipeline.run_one_cycle(&next).await;
        assert!(result.is_completed());
        assert_eq!(next, Cursor::after(T0 + 1_000, "T2"));
        assert_eq!(store.inner().count().await.unwrap(), 2);
        assert_eq!(h.notifier.sent_trans_nums(), vec!["T1"]);
    }

    #[tokio::test]
    async fn test_store_timeout_fails_load() {
        let store = Arc::new(FailingStore::default().with_delay(Duration::from_millis(200)));
        let h = Harness::with_parts(two_payments(), t1_is_fraud(), store.clone(), RecordingNotifier::new());
        let mut pipeline_config = config();
        pipeline_config.store.timeout_ms = 10;
        let pipeline = Pipeline::builder(pipeline_config)
            .with_source(h.source.clone())
            .with_scoring_backend(h.backend.clone())
            .with_store(store.clone())
            .with_ledger(h.ledger.clone())
            .with_notifier(h.notifier.clone())
            .build()
            .unwrap();

        let (_, result) = pipeline.run_one_cycle(&Cursor::start()).await;

        assert_eq!(result.failed_stage(), Some(CycleStage::Load));
        assert_eq!(store.inner().count().await.unwrap(), 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_alert_failure_does_not_fail_cycle() {
        let h = Harness::with_parts(
            two_payments(),
            t1_is_fraud(),
            Arc::new(InMemoryScoredPaymentStore::new()),
            RecordingNotifier::new().failing_for("T1"),
        );

        let (next, result) = h.pipeline.run_one_cycle(&Cursor::start()).await;
        assert!(result.is_completed());
        assert_eq!(result.counts.alert_failures, 1);
        assert_eq!(next, Cursor::after(T0 + 1_000, "T2"));
        assert!(!h.ledger.contains("T1").await.unwrap());

        // Continuing from the returned cursor does not revisit the row.
        h.notifier.recover();
        let (_, onward) = h.pipeline.run_one_cycle(&next).await;
        assert_eq!(onward.counts.extracted, 0);
        assert!(h.notifier.sent().is_empty());

        // Replaying the window delivers the missed alert.
        let (_, retry) = h.pipeline.run_one_cycle(&Cursor::at(T0)).await;
        assert_eq!(retry.counts.alerted, 1);
        assert_eq!(h.notifier.sent_trans_nums(), vec!["T1"]);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let source = two_payments().with_delay(Duration::from_millis(100));
        let h = Harness::new(source, t1_is_fraud());

        let start = Cursor::start();
        let (first, second) = tokio::join!(h.pipeline.run_one_cycle(&start), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.pipeline.run_one_cycle(&start).await
        });

        assert!(first.1.is_completed());
        assert!(second.1.is_skipped());
        assert_eq!(second.0, Cursor::start());
        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.events.events_of_type(CYCLE_SKIPPED).len(), 1);
        assert_eq!(h.pipeline.metrics().snapshot().cycles_skipped, 1);
    }

    #[tokio::test]
    async fn test_cancellation_before_load_writes_nothing() {
        let backend = t1_is_fraud().with_delay(Duration::from_millis(100));
        let h = Harness::new(two_payments(), backend);
        let token = h.pipeline.cancellation_token().clone();

        let start = Cursor::start();
        let ((next, result), ()) = tokio::join!(h.pipeline.run_one_cycle(&start), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel("shutdown");
        });

        assert_eq!(result.failed_stage(), Some(CycleStage::Load));
        assert_eq!(result.error_class(), Some(ErrorClass::Cancelled));
        assert_eq!(next, Cursor::start());
        assert_eq!(h.store.count().await.unwrap(), 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_events_are_emitted() {
        let h = Harness::new(two_payments(), ScriptedScoringBackend::constant(0.1));
        h.pipeline.run_one_cycle(&Cursor::start()).await;

        assert_eq!(
            h.events.event_types(),
            vec![
                "cycle.started",
                "cycle.stage_completed",
                "cycle.stage_completed",
                "cycle.stage_completed",
                "cycle.stage_completed",
                "cycle.stage_completed",
                "cycle.completed",
            ]
        );
        let (_, payload) = h.events.events_of_type("cycle.completed").remove(0);
        assert_eq!(payload.unwrap()["counts"]["loaded"], json!(2));
    }

    #[tokio::test]
    async fn test_scheduler_persists_cursor_on_success_only() {
        let backend = t1_is_fraud().fail_next(ScoringError::Permanent("bad request".into()));
        let h = Harness::new(two_payments(), backend);
        let cursors = Arc::new(InMemoryCursorStore::default());
        let scheduler = CycleScheduler::new(Arc::new(h.pipeline), cursors.clone());

        let failed = scheduler.run_once().await.unwrap();
        assert!(failed.is_failed());
        assert_eq!(cursors.load().await.unwrap(), Cursor::start());

        let completed = scheduler.run_once().await.unwrap();
        assert!(completed.is_completed());
        assert_eq!(cursors.load().await.unwrap(), Cursor::after(T0 + 1_000, "T2"));
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_cancel() {
        let h = Harness::new(two_payments(), t1_is_fraud());
        let pipeline = Arc::new(h.pipeline);
        let token = pipeline.cancellation_token().clone();
        let scheduler = CycleScheduler::new(pipeline.clone(), Arc::new(InMemoryCursorStore::default()))
            .with_interval(Duration::from_millis(10));

        tokio::join!(scheduler.run(), async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            token.cancel("shutdown");
        });

        let metrics = pipeline.metrics().snapshot();
        assert!(metrics.cycles_completed >= 1);
        assert_eq!(h.notifier.sent_trans_nums(), vec!["T1"]);
    }
}
