//! Payment records: the raw event as fetched and the scored, durable row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Column holding the transaction identifier.
pub const TRANS_NUM_FIELD: &str = "trans_num";
/// Column holding the event time in epoch milliseconds.
pub const EVENT_TIME_FIELD: &str = "current_time";
/// Column holding the payment amount.
pub const AMOUNT_FIELD: &str = "amt";

/// A payment event as fetched from the source.
///
/// Only the identifier, event time and amount are validated at fetch time.
/// Every other column is kept verbatim in `attributes` and cast later by the
/// feature transformer, which may skip the record if a cast fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPaymentEvent {
    /// Globally unique transaction identifier.
    pub trans_num: String,
    /// Event time in epoch milliseconds.
    pub event_time: i64,
    /// Payment amount.
    pub amount: f64,
    /// Remaining columns, uncast.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl RawPaymentEvent {
    /// Creates an event with no extra attributes.
    #[must_use]
    pub fn new(trans_num: impl Into<String>, event_time: i64, amount: f64) -> Self {
        Self {
            trans_num: trans_num.into(),
            event_time,
            amount,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns an attribute rendered as text, if present and not null.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Returns an attribute cast to a float, if present and castable.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(cast_f64)
    }

    /// Returns an attribute cast to an integer, if present and castable.
    #[must_use]
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(cast_i64)
    }
}

/// Casts a JSON value to a finite float. Numeric strings are accepted.
#[must_use]
pub fn cast_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Casts a JSON value to an integer. Integral floats and numeric strings are accepted.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn cast_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Reporting snapshot of the raw fields, stored alongside the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    /// Event time in epoch milliseconds.
    pub event_time: i64,
    /// Card number, as text.
    pub cc_num: Option<String>,
    /// Merchant name.
    pub merchant: Option<String>,
    /// Merchant category.
    pub category: Option<String>,
    /// Payment amount.
    pub amt: f64,
    /// Cardholder first name.
    pub first: Option<String>,
    /// Cardholder last name.
    pub last: Option<String>,
    /// Cardholder gender.
    pub gender: Option<String>,
    /// Cardholder street.
    pub street: Option<String>,
    /// Cardholder city.
    pub city: Option<String>,
    /// Cardholder state.
    pub state: Option<String>,
    /// Cardholder zip code.
    pub zip: Option<i64>,
    /// Cardholder latitude.
    pub lat: Option<f64>,
    /// Cardholder longitude.
    pub long: Option<f64>,
    /// Population of the cardholder city.
    pub city_pop: Option<i64>,
    /// Cardholder job.
    pub job: Option<String>,
    /// Cardholder date of birth.
    pub dob: Option<String>,
    /// Merchant latitude.
    pub merch_lat: Option<f64>,
    /// Merchant longitude.
    pub merch_long: Option<f64>,
}

impl From<&RawPaymentEvent> for PaymentSnapshot {
    fn from(event: &RawPaymentEvent) -> Self {
        Self {
            event_time: event.event_time,
            cc_num: event.text("cc_num"),
            merchant: event.text("merchant"),
            category: event.text("category"),
            amt: event.amount,
            first: event.text("first"),
            last: event.text("last"),
            gender: event.text("gender"),
            street: event.text("street"),
            city: event.text("city"),
            state: event.text("state"),
            zip: event.integer("zip"),
            lat: event.number("lat"),
            long: event.number("long"),
            city_pop: event.integer("city_pop"),
            job: event.text("job"),
            dob: event.text("dob"),
            merch_lat: event.number("merch_lat"),
            merch_long: event.number("merch_long"),
        }
    }
}

/// The durable, scored payment row. One per `trans_num`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPayment {
    /// Primary identifier.
    pub trans_num: String,
    /// Fraud probability in `[0, 1]`.
    pub fraud_probability: f64,
    /// `fraud_probability >= threshold` at scoring time.
    pub fraud_flag: bool,
    /// Model that produced the probability.
    pub model_version: String,
    /// When the row content was last scored.
    pub scored_at: DateTime<Utc>,
    /// Raw fields kept for reporting.
    pub snapshot: PaymentSnapshot,
}

impl ScoredPayment {
    /// Returns the UTC day the row was scored on.
    #[must_use]
    pub fn scored_day(&self) -> NaiveDate {
        self.scored_at.date_naive()
    }

    /// Fingerprint of everything except `scored_at`.
    ///
    /// Two rows with the same fingerprint carry the same logical content, so a
    /// replayed upsert keeps the original `scored_at`.
    #[must_use]
    pub fn content_fingerprint(&self) -> String {
        let content = serde_json::json!({
            "trans_num": self.trans_num,
            "fraud_probability": self.fraud_probability,
            "fraud_flag": self.fraud_flag,
            "model_version": self.model_version,
            "snapshot": self.snapshot,
        });
        let mut hasher = Sha256::new();
        hasher.update(content.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}
