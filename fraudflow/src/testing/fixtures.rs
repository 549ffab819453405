//! Sample payments for tests.

use crate::core::{PaymentSnapshot, RawPaymentEvent, ScoredPayment};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Model identifier used by fixtures.
pub const TEST_MODEL_ID: &str = "xgb-rt";

fn sample_attributes() -> Vec<(&'static str, Value)> {
    vec![
        ("cc_num", json!("4263982640269299")),
        ("merchant", json!("fraud_Kirlin and Sons")),
        ("category", json!("shopping_net")),
        ("first", json!("Jennifer")),
        ("last", json!("Banks")),
        ("gender", json!("F")),
        ("street", json!("561 Perry Cove")),
        ("city", json!("Moravian Falls")),
        ("state", json!("NC")),
        ("zip", json!(28654)),
        ("lat", json!(36.0788)),
        ("long", json!(-81.1781)),
        ("city_pop", json!(3495)),
        ("job", json!("Psychologist, counselling")),
        ("dob", json!("1988-03-09")),
        ("merch_lat", json!(36.011_293)),
        ("merch_long", json!(-82.048_315)),
    ]
}

/// A complete raw source row, as the source service returns it.
#[must_use]
pub fn sample_row(trans_num: &str, event_time_ms: i64, amt: f64) -> Map<String, Value> {
    let mut row: Map<String, Value> = sample_attributes()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    row.insert("trans_num".into(), json!(trans_num));
    row.insert("current_time".into(), json!(event_time_ms));
    row.insert("amt".into(), json!(amt));
    row
}

/// A complete raw event with every field the default layout reads.
#[must_use]
pub fn sample_event(trans_num: &str, event_time_ms: i64, amt: f64) -> RawPaymentEvent {
    sample_attributes()
        .into_iter()
        .fold(RawPaymentEvent::new(trans_num, event_time_ms, amt), |event, (k, v)| {
            event.with_attribute(k, v)
        })
}

/// A scored row for `trans_num` with a sample snapshot.
#[must_use]
pub fn scored_payment(
    trans_num: &str,
    probability: f64,
    fraud_flag: bool,
    amt: f64,
    scored_at: DateTime<Utc>,
) -> ScoredPayment {
    let event = sample_event(trans_num, scored_at.timestamp_millis(), amt);
    ScoredPayment {
        trans_num: trans_num.to_string(),
        fraud_probability: probability,
        fraud_flag,
        model_version: TEST_MODEL_ID.to_string(),
        scored_at,
        snapshot: PaymentSnapshot::from(&event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordValidator;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sample_row_validates_to_sample_event() {
        let event = RecordValidator::permissive()
            .validate(0, sample_row("T1", 1_000, 12.5))
            .unwrap();
        assert_eq!(event, sample_event("T1", 1_000, 12.5));
    }
}
