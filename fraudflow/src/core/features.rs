//! Feature vectors and the per-record transform outcome.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Model input derived from one payment event.
///
/// Values are ordered by the transformer's feature layout. Vectors live only
/// within a cycle and are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Transaction the features belong to.
    pub trans_num: String,
    /// Feature values in layout order.
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Creates a feature vector.
    #[must_use]
    pub fn new(trans_num: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            trans_num: trans_num.into(),
            values,
        }
    }

    /// Returns the number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Why a record was skipped by the transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A required field was absent or null.
    MissingField {
        /// Field name.
        field: String,
    },
    /// A required field could not be cast to a number.
    Uncastable {
        /// Field name.
        field: String,
        /// The raw value, rendered.
        value: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing field '{field}'"),
            Self::Uncastable { field, value } => {
                write!(f, "field '{field}' is not numeric: {value}")
            }
        }
    }
}

/// A record the transformer could not turn into features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Transaction that was skipped.
    pub trans_num: String,
    /// Why.
    pub reason: SkipReason,
}

/// Result of transforming one record.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// Features were produced.
    Features(FeatureVector),
    /// The record was skipped and should be counted.
    Skipped(SkippedRecord),
}

impl TransformOutcome {
    /// Returns true if the record was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Returns the feature vector, if one was produced.
    #[must_use]
    pub fn features(self) -> Option<FeatureVector> {
        match self {
            Self::Features(v) => Some(v),
            Self::Skipped(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::Uncastable {
            field: "lat".into(),
            value: "\"north\"".into(),
        };
        assert_eq!(reason.to_string(), "field 'lat' is not numeric: \"north\"");
        assert_eq!(
            SkipReason::MissingField { field: "zip".into() }.to_string(),
            "missing field 'zip'"
        );
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = TransformOutcome::Features(FeatureVector::new("T1", vec![1.0, 2.0]));
        assert!(!ok.is_skipped());
        assert_eq!(ok.features().map(|v| v.len()), Some(2));

        let skipped = TransformOutcome::Skipped(SkippedRecord {
            trans_num: "T2".into(),
            reason: SkipReason::MissingField { field: "lat".into() },
        });
        assert!(skipped.is_skipped());
        assert!(skipped.features().is_none());
    }

    #[test]
    fn test_skip_reason_serialize() {
        let json = serde_json::to_value(SkipReason::MissingField { field: "zip".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "missing_field", "field": "zip"}));
    }
}
