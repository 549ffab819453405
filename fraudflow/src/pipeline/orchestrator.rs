//! Cycle orchestration.
//!
//! [`Pipeline::run_one_cycle`] drives Extract → Transform → Score → Load →
//! Alert for one window and returns the cursor to persist together with the
//! cycle summary. The cursor only moves when the cycle completes, so a failed
//! cycle's window is fetched again next time; Load is idempotent, which makes
//! that replay safe.

use crate::alerts::{AlertDispatcher, AlertLedger, Notifier};
use crate::config::PipelineConfig;
use crate::core::{
    CycleResult, CycleStage, CycleState, Cursor, PaymentSnapshot, RawPaymentEvent, ScoredPayment,
};
use crate::errors::{ConfigurationError, PipelineError, StoreError};
use crate::events::{
    cycle_payload, stage_payload, EventSink, NoOpEventSink, CYCLE_COMPLETED, CYCLE_FAILED,
    CYCLE_SKIPPED, CYCLE_STAGE_COMPLETED, CYCLE_STARTED,
};
use crate::observability::CycleMetrics;
use crate::pipeline::CancellationToken;
use crate::scoring::{FraudThreshold, ScoringBackend, ScoringClient};
use crate::source::{FetchBatch, PaymentSource};
use crate::store::ScoredPaymentStore;
use crate::transform::FeatureTransformer;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Builder for a validated [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    source: Option<Arc<dyn PaymentSource>>,
    scoring: Option<Arc<dyn ScoringBackend>>,
    store: Option<Arc<dyn ScoredPaymentStore>>,
    ledger: Option<Arc<dyn AlertLedger>>,
    notifier: Option<Arc<dyn Notifier>>,
    events: Option<Arc<dyn EventSink>>,
    metrics: Option<Arc<CycleMetrics>>,
    cancel: Option<Arc<CancellationToken>>,
}

impl PipelineBuilder {
    /// Creates a builder for `config`.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sets the payment source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn PaymentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the inference backend.
    #[must_use]
    pub fn with_scoring_backend(mut self, backend: Arc<dyn ScoringBackend>) -> Self {
        self.scoring = Some(backend);
        self
    }

    /// Sets the durable store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ScoredPaymentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the alert ledger.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn AlertLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Sets the notification channel.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the event sink. Defaults to [`NoOpEventSink`].
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Shares a metrics collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<CycleMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Shares a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validates everything and builds the pipeline.
    ///
    /// Fails on invalid configuration, a missing component, or a transformer
    /// layout that differs from the scoring contract.
    pub fn build(self) -> Result<Pipeline, ConfigurationError> {
        self.config.validate()?;
        let threshold = FraudThreshold::new(self.config.fraud_threshold)?;

        let source = self.source.ok_or(ConfigurationError::MissingComponent("payment source"))?;
        let backend = self
            .scoring
            .ok_or(ConfigurationError::MissingComponent("scoring backend"))?;
        let store = self.store.ok_or(ConfigurationError::MissingComponent("scored payment store"))?;
        let ledger = self.ledger.ok_or(ConfigurationError::MissingComponent("alert ledger"))?;
        let notifier = self.notifier.ok_or(ConfigurationError::MissingComponent("notifier"))?;

        let transformer = FeatureTransformer::new(self.config.features.clone())?;
        if let Some(expected) = backend
            .feature_contract()
            .or_else(|| self.config.scoring.expected_features.clone())
        {
            transformer.align_to(&expected)?;
        }

        let events = self.events.unwrap_or_else(|| Arc::new(NoOpEventSink));
        let scoring = ScoringClient::new(backend, &self.config, transformer.feature_names());
        let alerts = AlertDispatcher::new(notifier, ledger, self.config.alerts.recipient.clone(), threshold)
            .with_send_timeout(self.config.send_timeout())
            .with_events(Arc::clone(&events));

        info!(
            model_id = %self.config.model_id,
            threshold = threshold.value(),
            features = transformer.width(),
            batch_size = self.config.batch_size,
            "Pipeline configured"
        );

        Ok(Pipeline {
            config: self.config,
            threshold,
            source,
            transformer,
            scoring,
            store,
            alerts,
            events,
            metrics: self.metrics.unwrap_or_default(),
            cancel: self.cancel.unwrap_or_else(CancellationToken::new),
            in_flight: tokio::sync::Mutex::new(()),
        })
    }
}

#[cfg(feature = "http")]
impl PipelineBuilder {
    /// Wires the HTTP source, HTTP scoring backend and, when a webhook URL is
    /// configured, the webhook notifier. Falls back to [`crate::alerts::LoggingNotifier`].
    pub fn with_http_defaults(self) -> Result<Self, ConfigurationError> {
        use crate::alerts::{LoggingNotifier, WebhookNotifier};
        use crate::scoring::HttpScoringBackend;
        use crate::source::HttpPaymentSource;

        let source = HttpPaymentSource::from_config(&self.config)?;
        let backend = HttpScoringBackend::from_config(&self.config);
        let notifier: Arc<dyn Notifier> = match &self.config.alerts.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => Arc::new(LoggingNotifier),
        };
        Ok(self
            .with_source(Arc::new(source))
            .with_scoring_backend(Arc::new(backend))
            .with_notifier(notifier))
    }
}

/// A configured fraud-scoring pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    threshold: FraudThreshold,
    source: Arc<dyn PaymentSource>,
    transformer: FeatureTransformer,
    scoring: ScoringClient,
    store: Arc<dyn ScoredPaymentStore>,
    alerts: AlertDispatcher,
    events: Arc<dyn EventSink>,
    metrics: Arc<CycleMetrics>,
    cancel: Arc<CancellationToken>,
    in_flight: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("model_id", &self.config.model_id)
            .field("threshold", &self.threshold)
            .field("transformer", &self.transformer)
            .field("scoring", &self.scoring)
            .finish_non_exhaustive()
    }
}

type StageFailure = (CycleStage, PipelineError);

impl Pipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the fraud threshold.
    #[must_use]
    pub fn threshold(&self) -> FraudThreshold {
        self.threshold
    }

    /// Returns the store, for reporting reads.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ScoredPaymentStore> {
        &self.store
    }

    /// Returns the metrics collector.
    #[must_use]
    pub fn metrics(&self) -> &Arc<CycleMetrics> {
        &self.metrics
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Runs one cycle from `cursor`.
    ///
    /// Never fails: errors end the cycle in `Failed` and are reported in the
    /// result. Returns the cursor to persist, which only differs from `cursor`
    /// when the cycle completed. If another cycle is in flight the call
    /// returns at once with a `Skipped` result.
    pub async fn run_one_cycle(&self, cursor: &Cursor) -> (Cursor, CycleResult) {
        let mut result = CycleResult::new();

        let Ok(_guard) = self.in_flight.try_lock() else {
            result.advance(CycleState::Skipped);
            warn!(cycle_id = %result.cycle_id, "Cycle already in flight, skipping trigger");
            self.events.emit(CYCLE_SKIPPED, Some(cycle_payload(&result))).await;
            self.metrics.record(&result);
            return (cursor.clone(), result);
        };

        info!(
            cycle_id = %result.cycle_id,
            watermark = ?cursor.watermark_ms,
            last_trans_num = ?cursor.last_trans_num,
            "Cycle started"
        );
        self.events.emit(CYCLE_STARTED, Some(cycle_payload(&result))).await;

        let next = match self.execute(cursor, &mut result).await {
            Ok(next) => {
                result.advance(CycleState::Completed);
                info!(
                    cycle_id = %result.cycle_id,
                    extracted = result.counts.extracted,
                    loaded = result.counts.loaded,
                    flagged = result.counts.flagged,
                    alerted = result.counts.alerted,
                    duration_ms = result.duration_ms(),
                    "Cycle completed"
                );
                self.events.emit(CYCLE_COMPLETED, Some(cycle_payload(&result))).await;
                next
            }
            Err((stage, err)) => {
                let error_class = err.error_class();
                error!(
                    cycle_id = %result.cycle_id,
                    %stage,
                    %error_class,
                    error = %err,
                    "Cycle failed"
                );
                result.advance(CycleState::Failed {
                    stage,
                    error_class,
                    message: err.to_string(),
                });
                self.events.emit(CYCLE_FAILED, Some(cycle_payload(&result))).await;
                cursor.clone()
            }
        };

        self.metrics.record(&result);
        (next, result)
    }

    async fn execute(&self, cursor: &Cursor, result: &mut CycleResult) -> Result<Cursor, StageFailure> {
        // Extract
        self.enter(result, CycleStage::Extract)?;
        let batch = self.extract(cursor).await.map_err(|e| (CycleStage::Extract, e))?;
        result.counts.extracted = batch.events.len();
        result.counts.rejected = batch.rejected.len();
        result.counts.duplicates = batch.duplicates;
        if batch.is_empty() {
            debug!(cycle_id = %result.cycle_id, "Empty window");
        }
        self.stage_done(result, CycleStage::Extract);

        // Transform
        self.enter(result, CycleStage::Transform)?;
        let (vectors, skipped) = self.transformer.transform_batch(&batch.events);
        result.counts.transformed = vectors.len();
        result.counts.skipped = skipped.len();
        self.stage_done(result, CycleStage::Transform);

        // Score
        self.enter(result, CycleStage::Score)?;
        let scores = self
            .scoring
            .score(&vectors)
            .await
            .map_err(|e| (CycleStage::Score, PipelineError::from(e)))?;
        let rows = self.assemble(&batch.events, scores);
        result.counts.scored = rows.len();
        result.counts.flagged = rows.iter().filter(|r| r.fraud_flag).count();
        self.stage_done(result, CycleStage::Score);

        // Load: past this point the cycle is no longer cancellable.
        self.enter(result, CycleStage::Load)?;
        result.counts.loaded = self
            .load(&rows)
            .await
            .map_err(|e| (CycleStage::Load, PipelineError::from(e)))?;
        self.stage_done(result, CycleStage::Load);

        // Alert
        result.advance(CycleState::Alerting);
        let report = self.alerts.dispatch(&rows).await;
        result.counts.alerted = report.notified.len();
        result.counts.already_alerted = report.already_alerted.len();
        result.counts.alert_failures = report.failed.len();
        self.stage_done(result, CycleStage::Alert);

        Ok(batch.next_cursor)
    }

    /// Moves into `stage`, honouring cancellation first.
    fn enter(&self, result: &mut CycleResult, stage: CycleStage) -> Result<(), StageFailure> {
        if self.cancel.is_cancelled() {
            let reason = self.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err((stage, PipelineError::Cancelled(reason)));
        }
        result.advance(stage.running_state());
        Ok(())
    }

    fn stage_done(&self, result: &CycleResult, stage: CycleStage) {
        info!(
            cycle_id = %result.cycle_id,
            %stage,
            extracted = result.counts.extracted,
            transformed = result.counts.transformed,
            skipped = result.counts.skipped,
            scored = result.counts.scored,
            loaded = result.counts.loaded,
            "Stage completed"
        );
        self.events
            .try_emit(CYCLE_STAGE_COMPLETED, Some(stage_payload(result, stage)));
    }

    async fn extract(&self, cursor: &Cursor) -> Result<FetchBatch, PipelineError> {
        let budget = self.attempt_budget(self.config.source_timeout());
        match tokio::time::timeout(budget, self.source.fetch(cursor, self.config.window_size)).await {
            Ok(batch) => Ok(batch?),
            Err(_) => Err(PipelineError::Source(crate::errors::SourceError::SourceUnavailable(
                format!("fetch did not finish within {}ms", budget.as_millis()),
            ))),
        }
    }

    /// Upper bound for a call retried under the configured policy.
    fn attempt_budget(&self, per_attempt: Duration) -> Duration {
        let retry = &self.config.retry;
        let attempts = u32::try_from(retry.max_attempts).unwrap_or(u32::MAX);
        per_attempt
            .saturating_mul(attempts)
            .saturating_add(Duration::from_millis(retry.max_delay_ms).saturating_mul(attempts))
    }

    fn assemble(&self, events: &[RawPaymentEvent], scores: Vec<crate::scoring::ProbabilityScore>) -> Vec<ScoredPayment> {
        let by_id: HashMap<&str, &RawPaymentEvent> =
            events.iter().map(|e| (e.trans_num.as_str(), e)).collect();
        let scored_at = Utc::now();

        scores
            .into_iter()
            .filter_map(|score| {
                let event = by_id.get(score.trans_num.as_str())?;
                Some(ScoredPayment {
                    fraud_flag: self.threshold.classify(score.probability),
                    fraud_probability: score.probability,
                    model_version: self.scoring.model_id().to_string(),
                    scored_at,
                    snapshot: PaymentSnapshot::from(*event),
                    trans_num: score.trans_num,
                })
            })
            .collect()
    }

    async fn load(&self, rows: &[ScoredPayment]) -> Result<usize, StoreError> {
        let timeout = self.config.store_timeout();
        match tokio::time::timeout(timeout, self.store.upsert_batch(rows)).await {
            Ok(written) => written,
            Err(_) => Err(StoreError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{InMemoryAlertLedger, LoggingNotifier};
    use crate::store::InMemoryScoredPaymentStore;
    use crate::testing::{ScriptedScoringBackend, ScriptedSource};

    fn builder() -> PipelineBuilder {
        Pipeline::builder(PipelineConfig::default())
            .with_source(Arc::new(ScriptedSource::new()))
            .with_scoring_backend(Arc::new(ScriptedScoringBackend::constant(0.1)))
            .with_store(Arc::new(InMemoryScoredPaymentStore::new()))
            .with_ledger(Arc::new(InMemoryAlertLedger::new()))
            .with_notifier(Arc::new(LoggingNotifier))
    }

    #[test]
    fn test_build_complete() {
        let pipeline = builder().build().unwrap();
        assert_eq!(pipeline.threshold().value(), 0.5);
    }

    #[test]
    fn test_missing_component() {
        let err = Pipeline::builder(PipelineConfig::default())
            .with_source(Arc::new(ScriptedSource::new()))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingComponent("scoring backend"));
    }

    #[test]
    fn test_invalid_threshold_fails_build() {
        let mut b = builder();
        b.config = PipelineConfig::new().with_threshold(1.2);
        assert_eq!(
            b.build().unwrap_err(),
            ConfigurationError::ThresholdOutOfRange(1.2)
        );
    }

    #[test]
    fn test_feature_contract_mismatch_fails_build() {
        let backend = ScriptedScoringBackend::constant(0.1)
            .with_feature_contract(vec!["amt".to_string(), "zip".to_string()]);
        let err = builder()
            .with_scoring_backend(Arc::new(backend))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::FeatureMismatch { position: 0, .. }));
    }

    #[test]
    fn test_attempt_budget() {
        let pipeline = builder().build().unwrap();
        // 3 attempts of 20s plus 3 capped delays of 30s
        assert_eq!(
            pipeline.attempt_budget(Duration::from_secs(20)),
            Duration::from_secs(150)
        );
    }
}
