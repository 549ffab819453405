//! Threshold classification.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns true iff `probability >= threshold`.
#[must_use]
pub fn classify(probability: f64, threshold: f64) -> bool {
    probability >= threshold
}

/// A fraud threshold known to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FraudThreshold(f64);

impl FraudThreshold {
    /// Validates a threshold.
    pub fn new(value: f64) -> Result<Self, ConfigurationError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigurationError::ThresholdOutOfRange(value))
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Classifies a probability against this threshold.
    #[must_use]
    pub fn classify(self, probability: f64) -> bool {
        classify(probability, self.0)
    }
}

impl Default for FraudThreshold {
    fn default() -> Self {
        Self(0.5)
    }
}

impl TryFrom<f64> for FraudThreshold {
    type Error = ConfigurationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FraudThreshold> for f64 {
    fn from(t: FraudThreshold) -> Self {
        t.0
    }
}

impl fmt::Display for FraudThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        let t = FraudThreshold::new(0.5).unwrap();
        assert!(t.classify(0.5));
        assert!(!t.classify(0.5 - f64::EPSILON));
        assert!(t.classify(0.92));
        assert!(!t.classify(0.0));
    }

    #[test]
    fn test_boundary_at_extremes() {
        assert!(classify(0.0, 0.0));
        assert!(classify(1.0, 1.0));
        assert!(!classify(0.999_999, 1.0));
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert_eq!(
            FraudThreshold::new(1.5),
            Err(ConfigurationError::ThresholdOutOfRange(1.5))
        );
        assert!(FraudThreshold::new(-0.1).is_err());
        assert!(FraudThreshold::new(f64::NAN).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let t: FraudThreshold = serde_json::from_str("0.7").unwrap();
        assert_eq!(t.value(), 0.7);
        assert!(serde_json::from_str::<FraudThreshold>("3.0").is_err());
    }
}
