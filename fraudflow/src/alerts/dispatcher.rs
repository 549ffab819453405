//! Alert dispatcher.

use super::{render_alert, AlertLedger, Notifier};
use crate::core::ScoredPayment;
use crate::errors::AlertError;
use crate::events::{EventSink, NoOpEventSink, ALERT_FAILED, ALERT_SENT};
use crate::scoring::FraudThreshold;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// What happened to each flagged row.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Transactions notified in this call.
    pub notified: Vec<String>,
    /// Transactions skipped because the ledger already had them.
    pub already_alerted: Vec<String>,
    /// Sends that failed.
    ///
    /// Nothing re-sends these on its own. The cursor still advances past the
    /// window, so a failed alert is only attempted again if a later cycle
    /// re-fetches the same rows, for example after a replay from an earlier
    /// cursor.
    pub failed: Vec<AlertError>,
}

/// Sends one notification per newly flagged payment.
///
/// Records are isolated: one failed send does not stop the others. The
/// ledger is written after a successful send; if that write fails the alert
/// is sent again only when a later cycle re-fetches the same row. That
/// duplicate is logged at error level when it becomes possible.
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    ledger: Arc<dyn AlertLedger>,
    recipient: String,
    threshold: FraudThreshold,
    send_timeout: Duration,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("recipient", &self.recipient)
            .field("threshold", &self.threshold)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl AlertDispatcher {
    /// Creates a dispatcher.
    pub fn new(
        notifier: Arc<dyn Notifier>,
        ledger: Arc<dyn AlertLedger>,
        recipient: impl Into<String>,
        threshold: FraudThreshold,
    ) -> Self {
        Self {
            notifier,
            ledger,
            recipient: recipient.into(),
            threshold,
            send_timeout: Duration::from_secs(5),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the per-send timeout.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Notifies every flagged row not already in the ledger.
    ///
    /// Unflagged rows are ignored.
    pub async fn dispatch(&self, rows: &[ScoredPayment]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for row in rows.iter().filter(|r| r.fraud_flag) {
            match self.ledger.contains(&row.trans_num).await {
                Ok(true) => {
                    report.already_alerted.push(row.trans_num.clone());
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        trans_num = %row.trans_num,
                        error = %e,
                        "Alert ledger unavailable, not sending; only a replay of this window will retry it"
                    );
                    self.fail(&mut report, &row.trans_num, AlertError::Ledger(e));
                    continue;
                }
            }

            let message = render_alert(row, self.threshold, &self.recipient);
            let sent = match tokio::time::timeout(self.send_timeout, self.notifier.send(&message)).await {
                Ok(result) => result,
                Err(_) => Err(AlertError::delivery(
                    &row.trans_num,
                    format!("send timed out after {}ms", self.send_timeout.as_millis()),
                )),
            };
            if let Err(e) = sent {
                warn!(trans_num = %row.trans_num, error = %e, "Alert send failed");
                self.fail(&mut report, &row.trans_num, e);
                continue;
            }

            if let Err(e) = self.ledger.record(&row.trans_num).await {
                error!(
                    trans_num = %row.trans_num,
                    error = %e,
                    "Alert sent but ledger write failed; a replay of this window will send it again"
                );
            }

            info!(trans_num = %row.trans_num, probability = row.fraud_probability, "Alert sent");
            self.events.try_emit(
                ALERT_SENT,
                Some(json!({
                    "trans_num": row.trans_num,
                    "fraud_probability": row.fraud_probability,
                    "idempotency_key": message.idempotency_key,
                })),
            );
            report.notified.push(row.trans_num.clone());
        }

        report
    }

    fn fail(&self, report: &mut DispatchReport, trans_num: &str, err: AlertError) {
        self.events.try_emit(
            ALERT_FAILED,
            Some(json!({"trans_num": trans_num, "error": err.to_string()})),
        );
        report.failed.push(err);
    }
}
