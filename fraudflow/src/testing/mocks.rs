//! Scriptable fakes for every pipeline dependency.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::{AlertLedger, AlertMessage, InMemoryAlertLedger, Notifier};
use crate::core::{Cursor, ScoredPayment};
use crate::errors::{AlertError, ScoringError, SourceError, StoreError};
use crate::scoring::{ScoringBackend, ScoringRequest};
use crate::source::{FetchBatch, PaymentSource, RecordValidator};
use crate::store::{DailyReport, InMemoryScoredPaymentStore, ScoredPaymentStore};

/// A source that serves rows held in memory through the real validator.
#[derive(Debug)]
pub struct ScriptedSource {
    rows: Mutex<Vec<Map<String, Value>>>,
    failures: Mutex<VecDeque<SourceError>>,
    validator: RecordValidator,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            validator: RecordValidator::permissive(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a source serving `rows`.
    #[must_use]
    pub fn with_rows(rows: Vec<Map<String, Value>>) -> Self {
        let source = Self::new();
        *source.rows.lock() = rows;
        source
    }

    /// Uses a specific validator.
    #[must_use]
    pub fn with_validator(mut self, validator: RecordValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Sleeps before every fetch.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues an error for the next fetch.
    #[must_use]
    pub fn fail_next(self, error: SourceError) -> Self {
        self.failures.lock().push_back(error);
        self
    }

    /// Appends a row to serve from now on.
    pub fn push_row(&self, row: Map<String, Value>) {
        self.rows.lock().push(row);
    }

    /// Number of fetches so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentSource for ScriptedSource {
    async fn fetch(&self, since: &Cursor, limit: usize) -> Result<FetchBatch, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        let rows = self.rows.lock().clone();
        Ok(self.validator.build_batch(rows.into_iter().map(Ok), since, limit))
    }
}

type Scorer = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// An inference backend driven by a closure over each feature row.
///
/// Per-transaction probabilities set with [`Self::set_probability`] take
/// precedence over the closure.
pub struct ScriptedScoringBackend {
    scorer: Scorer,
    overrides: Mutex<HashMap<String, f64>>,
    failures: Mutex<VecDeque<ScoringError>>,
    always: Option<ScoringError>,
    delay: Option<Duration>,
    contract: Option<Vec<String>>,
    calls: AtomicUsize,
}

impl std::fmt::Debug for ScriptedScoringBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedScoringBackend")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl ScriptedScoringBackend {
    /// Scores each row with `scorer`.
    #[must_use]
    pub fn from_fn<F>(scorer: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            scorer: Box::new(scorer),
            overrides: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            always: None,
            delay: None,
            contract: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Scores every row with `probability`.
    #[must_use]
    pub fn constant(probability: f64) -> Self {
        Self::from_fn(move |_| probability)
    }

    /// Returns `probability` for `trans_num`.
    #[must_use]
    pub fn with_probability(self, trans_num: &str, probability: f64) -> Self {
        self.set_probability(trans_num, probability);
        self
    }

    /// Changes the probability for `trans_num` between cycles.
    pub fn set_probability(&self, trans_num: &str, probability: f64) {
        self.overrides.lock().insert(trans_num.to_string(), probability);
    }

    /// Queues an error for the next call.
    #[must_use]
    pub fn fail_next(self, error: ScoringError) -> Self {
        self.failures.lock().push_back(error);
        self
    }

    /// Fails every call with `error`.
    #[must_use]
    pub fn always_fail(mut self, error: ScoringError) -> Self {
        self.always = Some(error);
        self
    }

    /// Sleeps before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Publishes a feature contract.
    #[must_use]
    pub fn with_feature_contract(mut self, names: Vec<String>) -> Self {
        self.contract = Some(names);
        self
    }

    /// Number of predict calls so far, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringBackend for ScriptedScoringBackend {
    async fn predict(&self, request: &ScoringRequest) -> Result<Vec<f64>, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.always {
            return Err(error.clone());
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        let overrides = self.overrides.lock();
        Ok(request
            .trans_nums
            .iter()
            .zip(&request.instances)
            .map(|(id, row)| overrides.get(id).copied().unwrap_or_else(|| (self.scorer)(row)))
            .collect())
    }

    fn feature_contract(&self) -> Option<Vec<String>> {
        self.contract.clone()
    }
}

/// A notifier that records what it sends.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AlertMessage>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    /// Creates a notifier that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps before every send.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Rejects sends for `trans_num` until [`Self::recover`] is called.
    #[must_use]
    pub fn failing_for(self, trans_num: &str) -> Self {
        self.failing.lock().insert(trans_num.to_string());
        self
    }

    /// Accepts every send from now on.
    pub fn recover(&self) {
        self.failing.lock().clear();
    }

    /// Messages delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().clone()
    }

    /// Transaction ids delivered so far, in send order.
    #[must_use]
    pub fn sent_trans_nums(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.trans_num.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), AlertError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&message.trans_num) {
            return Err(AlertError::delivery(&message.trans_num, "channel rejected the message"));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// A ledger whose reads or writes fail.
#[derive(Debug, Default)]
pub struct FailingAlertLedger {
    inner: InMemoryAlertLedger,
    fail_reads: bool,
    fail_writes: bool,
}

impl FailingAlertLedger {
    /// Reads succeed, writes fail.
    #[must_use]
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Reads fail.
    #[must_use]
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }
}

fn ledger_down() -> StoreError {
    StoreError::StoreUnavailable("ledger unavailable".into())
}

#[async_trait]
impl AlertLedger for FailingAlertLedger {
    async fn contains(&self, trans_num: &str) -> Result<bool, StoreError> {
        if self.fail_reads {
            return Err(ledger_down());
        }
        self.inner.contains(trans_num).await
    }

    async fn record(&self, trans_num: &str) -> Result<bool, StoreError> {
        if self.fail_writes {
            return Err(ledger_down());
        }
        self.inner.record(trans_num).await
    }

    async fn len(&self) -> Result<usize, StoreError> {
        if self.fail_reads {
            return Err(ledger_down());
        }
        self.inner.len().await
    }
}

/// An in-memory store whose writes can be switched off.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: Arc<InMemoryScoredPaymentStore>,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl FailingStore {
    /// Creates a store that fails every write.
    #[must_use]
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    /// Sleeps before every write.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Switches write failures on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The backing store.
    #[must_use]
    pub fn inner(&self) -> &Arc<InMemoryScoredPaymentStore> {
        &self.inner
    }
}

#[async_trait]
impl ScoredPaymentStore for FailingStore {
    async fn upsert_batch(&self, rows: &[ScoredPayment]) -> Result<usize, StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::StoreUnavailable("connection refused".into()));
        }
        self.inner.upsert_batch(rows).await
    }

    async fn get(&self, trans_num: &str) -> Result<Option<ScoredPayment>, StoreError> {
        self.inner.get(trans_num).await
    }

    async fn daily_report(&self, day: NaiveDate) -> Result<DailyReport, StoreError> {
        self.inner.daily_report(day).await
    }

    async fn list_scored(&self, day: NaiveDate, fraud_only: bool) -> Result<Vec<ScoredPayment>, StoreError> {
        self.inner.list_scored(day, fraud_only).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}
