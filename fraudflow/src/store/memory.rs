//! In-memory store.

use super::{check_row, merge_row, DailyReport, ScoredPaymentStore};
use crate::core::ScoredPayment;
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Scored payments held in a map behind one lock.
///
/// A batch is validated first and then applied under a single write guard,
/// so readers see either none or all of it.
#[derive(Debug, Default)]
pub struct InMemoryScoredPaymentStore {
    rows: RwLock<BTreeMap<String, ScoredPayment>>,
}

impl InMemoryScoredPaymentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every row ordered by `trans_num`.
    #[must_use]
    pub fn rows(&self) -> Vec<ScoredPayment> {
        self.rows.read().values().cloned().collect()
    }
}

#[async_trait]
impl ScoredPaymentStore for InMemoryScoredPaymentStore {
    async fn upsert_batch(&self, rows: &[ScoredPayment]) -> Result<usize, StoreError> {
        for row in rows {
            check_row(row)?;
        }

        let mut guard = self.rows.write();
        for row in rows {
            let merged = merge_row(guard.get(&row.trans_num), row);
            guard.insert(row.trans_num.clone(), merged);
        }
        Ok(rows.len())
    }

    async fn get(&self, trans_num: &str) -> Result<Option<ScoredPayment>, StoreError> {
        Ok(self.rows.read().get(trans_num).cloned())
    }

    async fn daily_report(&self, day: NaiveDate) -> Result<DailyReport, StoreError> {
        Ok(DailyReport::from_rows(day, self.rows.read().values()))
    }

    async fn list_scored(&self, day: NaiveDate, fraud_only: bool) -> Result<Vec<ScoredPayment>, StoreError> {
        let mut rows: Vec<ScoredPayment> = self
            .rows
            .read()
            .values()
            .filter(|r| r.scored_day() == day && (!fraud_only || r.fraud_flag))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.scored_at.cmp(&a.scored_at).then_with(|| a.trans_num.cmp(&b.trans_num)));
        Ok(rows)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rows.read().len())
    }
}
