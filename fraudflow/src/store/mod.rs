//! Durable store of scored payments.
//!
//! Rows are keyed by `trans_num` and written only through
//! [`ScoredPaymentStore::upsert_batch`], which applies a whole cycle as one
//! atomic unit. Replaying a batch leaves the store unchanged: a row whose
//! content is identical to the stored one keeps its original `scored_at`.

mod memory;
mod report;

#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryScoredPaymentStore;
pub use report::DailyReport;

#[cfg(feature = "postgres")]
pub use postgres::{PgAlertLedger, PgScoredPaymentStore};

use crate::core::ScoredPayment;
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Relational-style store of [`ScoredPayment`] rows.
#[async_trait]
pub trait ScoredPaymentStore: Send + Sync {
    /// Inserts or overwrites every row, all or nothing. Returns rows written.
    async fn upsert_batch(&self, rows: &[ScoredPayment]) -> Result<usize, StoreError>;

    /// Reads one row.
    async fn get(&self, trans_num: &str) -> Result<Option<ScoredPayment>, StoreError>;

    /// Totals for rows scored on `day`.
    async fn daily_report(&self, day: NaiveDate) -> Result<DailyReport, StoreError>;

    /// Rows scored on `day`, newest first, optionally flagged only.
    async fn list_scored(&self, day: NaiveDate, fraud_only: bool) -> Result<Vec<ScoredPayment>, StoreError>;

    /// Number of rows stored.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Totals for the day before `today`.
    async fn previous_day_report(&self, today: NaiveDate) -> Result<DailyReport, StoreError> {
        let day = today
            .pred_opt()
            .ok_or_else(|| StoreError::Rejected(format!("no day before {today}")))?;
        self.daily_report(day).await
    }
}

/// Checks a row may be written.
pub(crate) fn check_row(row: &ScoredPayment) -> Result<(), StoreError> {
    if row.trans_num.trim().is_empty() {
        return Err(StoreError::Rejected("row with empty trans_num".to_string()));
    }
    if !(0.0..=1.0).contains(&row.fraud_probability) {
        return Err(StoreError::Rejected(format!(
            "probability {} for {} is outside [0, 1]",
            row.fraud_probability, row.trans_num
        )));
    }
    Ok(())
}

/// The row to store when `incoming` replaces `existing`.
///
/// All fields are overwritten. If the content is unchanged the stored
/// `scored_at` is kept, so replays produce no drift.
pub(crate) fn merge_row(existing: Option<&ScoredPayment>, incoming: &ScoredPayment) -> ScoredPayment {
    match existing {
        Some(current) if current.content_fingerprint() == incoming.content_fingerprint() => {
            current.clone()
        }
        _ => incoming.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scored_payment;
    use chrono::{Duration, Utc};

    #[test]
    fn test_merge_keeps_scored_at_for_identical_content() {
        let first = scored_payment("T1", 0.92, true, 10.0, Utc::now());
        let mut replay = first.clone();
        replay.scored_at = first.scored_at + Duration::minutes(1);

        assert_eq!(merge_row(Some(&first), &replay).scored_at, first.scored_at);
    }

    #[test]
    fn test_merge_overwrites_changed_content() {
        let first = scored_payment("T1", 0.92, true, 10.0, Utc::now());
        let mut rescored = first.clone();
        rescored.fraud_probability = 0.3;
        rescored.fraud_flag = false;
        rescored.scored_at = first.scored_at + Duration::minutes(1);

        assert_eq!(merge_row(Some(&first), &rescored), rescored);
        assert_eq!(merge_row(None, &rescored), rescored);
    }

    #[test]
    fn test_check_row() {
        assert!(check_row(&scored_payment("T1", 0.5, true, 1.0, Utc::now())).is_ok());
        assert!(check_row(&scored_payment(" ", 0.5, true, 1.0, Utc::now())).is_err());
        assert!(check_row(&scored_payment("T1", 1.5, true, 1.0, Utc::now())).is_err());
    }
}
