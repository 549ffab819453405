//! Shape validation of fetched rows and window assembly.

use super::FetchBatch;
use crate::config::SourceConfig;
use crate::core::{cast_f64, cast_i64, Cursor, RawPaymentEvent, AMOUNT_FIELD, EVENT_TIME_FIELD, TRANS_NUM_FIELD};
use crate::errors::{ConfigurationError, SourceError};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Checks each row carries a usable identifier, event time and amount.
///
/// Other columns are kept uncast; the feature transformer decides whether
/// they are usable.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    trans_num_pattern: Option<Regex>,
}

impl RecordValidator {
    /// Creates a validator requiring `trans_num` to match `pattern`.
    pub fn new(pattern: &str) -> Result<Self, ConfigurationError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ConfigurationError::invalid("source.trans_num_pattern", e.to_string()))?;
        Ok(Self {
            trans_num_pattern: Some(regex),
        })
    }

    /// Creates a validator from the source configuration.
    pub fn from_config(config: &SourceConfig) -> Result<Self, ConfigurationError> {
        Self::new(&config.trans_num_pattern)
    }

    /// A validator that only requires a non-empty `trans_num`.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            trans_num_pattern: None,
        }
    }

    /// Validates one row.
    pub fn validate(&self, index: usize, mut row: Map<String, Value>) -> Result<RawPaymentEvent, SourceError> {
        let trans_num = match row.remove(TRANS_NUM_FIELD) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Null) | None => {
                return Err(SourceError::invalid_payload(index, None, "missing trans_num"));
            }
            Some(other) => {
                return Err(SourceError::invalid_payload(
                    index,
                    None,
                    format!("trans_num has unsupported type: {other}"),
                ));
            }
        };
        if trans_num.is_empty() {
            return Err(SourceError::invalid_payload(index, None, "empty trans_num"));
        }
        if let Some(pattern) = &self.trans_num_pattern {
            if !pattern.is_match(&trans_num) {
                return Err(SourceError::invalid_payload(
                    index,
                    Some(trans_num),
                    "trans_num does not match the configured pattern",
                ));
            }
        }

        let event_time = row
            .remove(EVENT_TIME_FIELD)
            .as_ref()
            .and_then(cast_i64)
            .ok_or_else(|| {
                SourceError::invalid_payload(index, Some(trans_num.clone()), "missing or non-integer current_time")
            })?;

        let amount = row
            .remove(AMOUNT_FIELD)
            .as_ref()
            .and_then(cast_f64)
            .ok_or_else(|| {
                SourceError::invalid_payload(index, Some(trans_num.clone()), "missing or non-numeric amt")
            })?;

        Ok(RawPaymentEvent {
            trans_num,
            event_time,
            amount,
            attributes: row.into_iter().collect(),
        })
    }

    /// Builds the window after `since` from parsed rows.
    ///
    /// Invalid rows are dropped into `rejected`. A `trans_num` seen twice keeps
    /// its last occurrence. Events are ordered by `(event_time, trans_num)` and
    /// the earliest `limit` are kept. The proposed cursor sits just past the
    /// last kept event.
    pub fn build_batch<I>(&self, rows: I, since: &Cursor, limit: usize) -> FetchBatch
    where
        I: IntoIterator<Item = Result<Map<String, Value>, SourceError>>,
    {
        let mut rejected = Vec::new();
        let mut events: Vec<RawPaymentEvent> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut duplicates = 0;

        for (index, row) in rows.into_iter().enumerate() {
            let event = match row.and_then(|row| self.validate(index, row)) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Dropping invalid payment record");
                    rejected.push(e);
                    continue;
                }
            };
            if !since.admits(event.event_time, &event.trans_num) {
                continue;
            }
            if let Some(&pos) = positions.get(&event.trans_num) {
                duplicates += 1;
                events[pos] = event;
            } else {
                positions.insert(event.trans_num.clone(), events.len());
                events.push(event);
            }
        }

        events.sort_by(|a, b| {
            a.event_time
                .cmp(&b.event_time)
                .then_with(|| a.trans_num.cmp(&b.trans_num))
        });
        events.truncate(limit);

        let next_cursor = events.last().map_or_else(
            || since.clone(),
            |e| since.clone().advanced_to(e.event_time, &e.trans_num),
        );

        debug!(
            events = events.len(),
            rejected = rejected.len(),
            duplicates,
            "Assembled payment window"
        );

        FetchBatch {
            events,
            next_cursor,
            rejected,
            duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn validator() -> RecordValidator {
        RecordValidator::from_config(&SourceConfig::default()).unwrap()
    }

    #[test]
    fn test_valid_row() {
        let event = validator()
            .validate(
                0,
                row(json!({"trans_num": "abc123", "current_time": 1000, "amt": "12.5", "merchant": "m"})),
            )
            .unwrap();

        assert_eq!(event.trans_num, "abc123");
        assert_eq!(event.event_time, 1000);
        assert_eq!(event.amount, 12.5);
        assert_eq!(event.attributes.get("merchant"), Some(&json!("m")));
        assert!(!event.attributes.contains_key("trans_num"));
    }

    #[test]
    fn test_missing_trans_num_rejected() {
        let err = validator()
            .validate(4, row(json!({"current_time": 1, "amt": 1.0})))
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidPayload { index: 4, trans_num: None, .. }));
    }

    #[test]
    fn test_pattern_mismatch_rejected() {
        let err = validator()
            .validate(0, row(json!({"trans_num": "bad id!", "current_time": 1, "amt": 1.0})))
            .unwrap_err();
        assert!(err.to_string().contains("pattern"));

        let permissive = RecordValidator::permissive()
            .validate(0, row(json!({"trans_num": "bad id!", "current_time": 1, "amt": 1.0})));
        assert!(permissive.is_ok());
    }

    #[test]
    fn test_bad_time_or_amount_rejected() {
        let v = validator();
        assert!(v
            .validate(0, row(json!({"trans_num": "T1", "current_time": "soon", "amt": 1.0})))
            .is_err());
        assert!(v
            .validate(0, row(json!({"trans_num": "T1", "current_time": 1})))
            .is_err());
    }

    #[test]
    fn test_build_batch_filters_dedupes_and_orders() {
        let rows = vec![
            Ok(row(json!({"trans_num": "T3", "current_time": 30, "amt": 1.0}))),
            Ok(row(json!({"trans_num": "T1", "current_time": 10, "amt": 1.0}))),
            Ok(row(json!({"trans_num": "T0", "current_time": 5, "amt": 1.0}))),
            Ok(row(json!({"current_time": 20, "amt": 1.0}))),
            Ok(row(json!({"trans_num": "T1", "current_time": 12, "amt": 2.0}))),
        ];

        let batch = validator().build_batch(rows, &Cursor::at(10), 100);

        let ids: Vec<_> = batch.events.iter().map(|e| e.trans_num.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T3"]);
        assert_eq!(batch.events[0].amount, 2.0);
        assert_eq!(batch.duplicates, 1);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.next_cursor, Cursor::after(30, "T3"));
    }

    #[test]
    fn test_build_batch_respects_limit() {
        let rows = (0..5).map(|i| Ok(row(json!({"trans_num": format!("T{i}"), "current_time": 100 - i, "amt": 1.0}))));
        let batch = validator().build_batch(rows, &Cursor::start(), 2);

        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].trans_num, "T4");
        assert_eq!(batch.next_cursor, Cursor::after(97, "T3"));
    }

    #[test]
    fn test_ties_at_one_timestamp_page_forward() {
        let rows = || {
            ["A3", "A1", "A2", "A4"]
                .into_iter()
                .map(|id| Ok(row(json!({"trans_num": id, "current_time": 100, "amt": 1.0}))))
                .chain(std::iter::once(Ok(row(json!({"trans_num": "B1", "current_time": 200, "amt": 1.0})))))
        };

        let first = validator().build_batch(rows(), &Cursor::start(), 2);
        let ids: Vec<_> = first.events.iter().map(|e| e.trans_num.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A2"]);
        assert_eq!(first.next_cursor, Cursor::after(100, "A2"));

        let second = validator().build_batch(rows(), &first.next_cursor, 2);
        let ids: Vec<_> = second.events.iter().map(|e| e.trans_num.as_str()).collect();
        assert_eq!(ids, vec!["A3", "A4"]);

        let third = validator().build_batch(rows(), &second.next_cursor, 2);
        let ids: Vec<_> = third.events.iter().map(|e| e.trans_num.as_str()).collect();
        assert_eq!(ids, vec!["B1"]);
        assert_eq!(third.next_cursor, Cursor::after(200, "B1"));
    }

    #[test]
    fn test_empty_window_keeps_cursor() {
        let batch = validator().build_batch(Vec::new(), &Cursor::at(50), 10);
        assert!(batch.is_empty());
        assert_eq!(batch.next_cursor, Cursor::at(50));
    }
}
