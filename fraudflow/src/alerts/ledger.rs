//! Ledger of already-alerted transactions.

use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Durable set of `trans_num` values that have triggered a notification.
///
/// A `trans_num` is recorded at most once.
#[async_trait]
pub trait AlertLedger: Send + Sync {
    /// Returns true if an alert was already sent for `trans_num`.
    async fn contains(&self, trans_num: &str) -> Result<bool, StoreError>;

    /// Records `trans_num`. Returns false if it was already present.
    async fn record(&self, trans_num: &str) -> Result<bool, StoreError>;

    /// Number of recorded transactions.
    async fn len(&self) -> Result<usize, StoreError>;
}

/// Ledger held in a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryAlertLedger {
    entries: DashMap<String, DateTime<Utc>>,
}

impl InMemoryAlertLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When `trans_num` was recorded.
    #[must_use]
    pub fn alerted_at(&self, trans_num: &str) -> Option<DateTime<Utc>> {
        self.entries.get(trans_num).map(|e| *e.value())
    }
}

#[async_trait]
impl AlertLedger for InMemoryAlertLedger {
    async fn contains(&self, trans_num: &str) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(trans_num))
    }

    async fn record(&self, trans_num: &str) -> Result<bool, StoreError> {
        let mut inserted = false;
        self.entries.entry(trans_num.to_string()).or_insert_with(|| {
            inserted = true;
            Utc::now()
        });
        Ok(inserted)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }
}
