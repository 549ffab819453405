//! Alert rendering.

use crate::core::ScoredPayment;
use crate::scoring::FraudThreshold;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A rendered notification for one flagged payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
    /// Who receives the alert.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Transaction the alert is about.
    pub trans_num: String,
    /// Deterministic key a receiver can use to collapse repeated sends.
    pub idempotency_key: String,
}

/// Deterministic idempotency key for the alert about `trans_num`.
#[must_use]
pub fn alert_idempotency_key(trans_num: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"fraud-alert:");
    hasher.update(trans_num.as_bytes());
    hex::encode(hasher.finalize())
}

/// Renders the alert for a flagged row.
#[must_use]
pub fn render_alert(row: &ScoredPayment, threshold: FraudThreshold, recipient: &str) -> AlertMessage {
    let subject = format!("Fraud alert - trans_num={}", row.trans_num);
    let body = format!(
        "Suspicious transaction detected\n\
         trans_num: {}\n\
         fraud_probability: {:.4}\n\
         threshold: {}\n\
         model_version: {}\n",
        row.trans_num, row.fraud_probability, threshold, row.model_version
    );
    AlertMessage {
        recipient: recipient.to_string(),
        subject,
        body,
        trans_num: row.trans_num.clone(),
        idempotency_key: alert_idempotency_key(&row.trans_num),
    }
}
