//! Daily aggregate report.

use crate::core::ScoredPayment;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Payments and fraud totals for one scored day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    /// Day the rows were scored on (UTC).
    pub day: NaiveDate,
    /// Rows scored that day.
    pub total_payments: u64,
    /// Rows flagged that day.
    pub total_frauds: u64,
    /// `total_frauds / total_payments`, 0 for an empty day.
    pub fraud_rate: f64,
    /// Sum of flagged amounts.
    pub fraud_amount: f64,
}

impl DailyReport {
    /// An empty report.
    #[must_use]
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            total_payments: 0,
            total_frauds: 0,
            fraud_rate: 0.0,
            fraud_amount: 0.0,
        }
    }

    /// Builds a report from totals.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_totals(day: NaiveDate, total_payments: u64, total_frauds: u64, fraud_amount: f64) -> Self {
        let fraud_rate = if total_payments == 0 {
            0.0
        } else {
            total_frauds as f64 / total_payments as f64
        };
        Self {
            day,
            total_payments,
            total_frauds,
            fraud_rate,
            fraud_amount,
        }
    }

    /// Aggregates the rows scored on `day`; rows from other days are ignored.
    #[must_use]
    pub fn from_rows<'a, I>(day: NaiveDate, rows: I) -> Self
    where
        I: IntoIterator<Item = &'a ScoredPayment>,
    {
        let mut total = 0;
        let mut frauds = 0;
        let mut amount = 0.0;
        for row in rows.into_iter().filter(|r| r.scored_day() == day) {
            total += 1;
            if row.fraud_flag {
                frauds += 1;
                amount += row.snapshot.amt;
            }
        }
        Self::from_totals(day, total, frauds, amount)
    }
}
