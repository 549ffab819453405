//! Process-lifetime cycle counters.

use crate::core::CycleResult;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated once per cycle.
#[derive(Debug, Default)]
pub struct CycleMetrics {
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    cycles_skipped: AtomicU64,
    records_loaded: AtomicU64,
    records_skipped: AtomicU64,
    records_rejected: AtomicU64,
    alerts_sent: AtomicU64,
    alert_failures: AtomicU64,
}

/// Point-in-time copy of [`CycleMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Cycles that reached `Completed`.
    pub cycles_completed: u64,
    /// Cycles that reached `Failed`.
    pub cycles_failed: u64,
    /// Triggers skipped due to overlap.
    pub cycles_skipped: u64,
    /// Rows upserted.
    pub records_loaded: u64,
    /// Records skipped by the transformer.
    pub records_skipped: u64,
    /// Records dropped by source validation.
    pub records_rejected: u64,
    /// Alerts delivered.
    pub alerts_sent: u64,
    /// Alerts that failed to send.
    pub alert_failures: u64,
}

fn add(counter: &AtomicU64, n: usize) {
    counter.fetch_add(u64::try_from(n).unwrap_or(u64::MAX), Ordering::Relaxed);
}

impl CycleMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a finished cycle into the counters.
    pub fn record(&self, result: &CycleResult) {
        if result.is_completed() {
            self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        } else if result.is_failed() {
            self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        } else if result.is_skipped() {
            self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
        }
        let counts = &result.counts;
        add(&self.records_loaded, counts.loaded);
        add(&self.records_skipped, counts.skipped);
        add(&self.records_rejected, counts.rejected);
        add(&self.alerts_sent, counts.alerted);
        add(&self.alert_failures, counts.alert_failures);
    }

    /// Returns the current values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            records_loaded: self.records_loaded.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alert_failures: self.alert_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CycleStage, CycleState};
    use crate::errors::ErrorClass;

    #[test]
    fn test_record_cycles() {
        let metrics = CycleMetrics::new();

        let mut ok = CycleResult::new();
        for stage in CycleStage::ALL {
            ok.advance(stage.running_state());
        }
        ok.advance(CycleState::Completed);
        ok.counts.loaded = 4;
        ok.counts.alerted = 1;
        metrics.record(&ok);

        let mut failed = CycleResult::new();
        failed.advance(CycleState::Extracting);
        failed.advance(CycleState::Failed {
            stage: CycleStage::Extract,
            error_class: ErrorClass::TransientDependencyError,
            message: "down".into(),
        });
        metrics.record(&failed);

        let mut skipped = CycleResult::new();
        skipped.advance(CycleState::Skipped);
        metrics.record(&skipped);

        let snap = metrics.snapshot();
        assert_eq!(snap.cycles_completed, 1);
        assert_eq!(snap.cycles_failed, 1);
        assert_eq!(snap.cycles_skipped, 1);
        assert_eq!(snap.records_loaded, 4);
        assert_eq!(snap.alerts_sent, 1);
    }
}
