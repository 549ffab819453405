//! Error types for the fraudflow pipeline.
//!
//! Each external boundary has its own error enum. [`PipelineError`] is the
//! stage-level error that moves a cycle to `Failed`, and [`ErrorClass`] is the
//! operator-facing taxonomy used in log lines and cycle events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Operator-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Per-record problem, skipped and counted.
    ValidationError,
    /// Retryable dependency failure (timeouts, 5xx, connection resets).
    TransientDependencyError,
    /// Non-retryable dependency failure (malformed request, auth failure).
    PermanentDependencyError,
    /// Durable store failure; the in-progress batch is rolled back.
    StoreError,
    /// Invalid startup configuration.
    ConfigurationError,
    /// The cycle was cancelled before Load began.
    Cancelled,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ValidationError => "ValidationError",
            Self::TransientDependencyError => "TransientDependencyError",
            Self::PermanentDependencyError => "PermanentDependencyError",
            Self::StoreError => "StoreError",
            Self::ConfigurationError => "ConfigurationError",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Errors raised by the payment source boundary.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Network or transport failure reaching the source.
    #[error("payment source unavailable: {0}")]
    SourceUnavailable(String),

    /// The response envelope itself could not be understood.
    #[error("malformed source response: {0}")]
    MalformedResponse(String),

    /// A single record failed shape validation.
    #[error("invalid payload at row {index}: {reason}")]
    InvalidPayload {
        /// Row position within the fetched batch.
        index: usize,
        /// Transaction identifier, when one could be read.
        trans_num: Option<String>,
        /// Why the record was rejected.
        reason: String,
    },
}

impl SourceError {
    /// Creates an invalid payload error for a row.
    #[must_use]
    pub fn invalid_payload(index: usize, trans_num: Option<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            index,
            trans_num,
            reason: reason.into(),
        }
    }

    /// Returns the operator-facing class of this error.
    #[must_use]
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::SourceUnavailable(_) => ErrorClass::TransientDependencyError,
            Self::MalformedResponse(_) => ErrorClass::PermanentDependencyError,
            Self::InvalidPayload { .. } => ErrorClass::ValidationError,
        }
    }
}

/// Errors raised by the scoring boundary.
#[derive(Debug, Clone, Error)]
pub enum ScoringError {
    /// Retryable failure: timeout, 5xx, connection reset.
    #[error("transient scoring failure: {0}")]
    Transient(String),

    /// Non-retryable failure: malformed request, auth failure, bad response.
    #[error("permanent scoring failure: {0}")]
    Permanent(String),

    /// Transient failures persisted past the retry budget.
    #[error("scoring unavailable after {attempts} attempts: {last_error}")]
    ScoringUnavailable {
        /// Attempts made, including the first.
        attempts: usize,
        /// Message of the final transient failure.
        last_error: String,
    },
}

impl ScoringError {
    /// Returns true if the failure may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns the operator-facing class of this error.
    #[must_use]
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::Transient(_) | Self::ScoringUnavailable { .. } => {
                ErrorClass::TransientDependencyError
            }
            Self::Permanent(_) => ErrorClass::PermanentDependencyError,
        }
    }
}

/// Errors raised by the durable store and the alert ledger.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Connection or transaction failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The batch was rejected before anything was written.
    #[error("store rejected batch: {0}")]
    Rejected(String),

    /// The store did not answer in time.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised while delivering a single alert.
#[derive(Debug, Clone, Error)]
pub enum AlertError {
    /// The notification channel refused or failed the send.
    #[error("alert delivery failed for {trans_num}: {reason}")]
    Delivery {
        /// Transaction the alert was about.
        trans_num: String,
        /// Failure detail.
        reason: String,
    },

    /// The ledger could not be consulted before sending.
    #[error("alert ledger unavailable: {0}")]
    Ledger(#[from] StoreError),
}

impl AlertError {
    /// Creates a delivery error.
    #[must_use]
    pub fn delivery(trans_num: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            trans_num: trans_num.into(),
            reason: reason.into(),
        }
    }
}

/// Invalid configuration detected at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// The fraud threshold is outside `[0, 1]` or not a number.
    #[error("fraud threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),

    /// A field holds an unusable value.
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidValue {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Transformer output does not match the scoring contract.
    #[error(
        "feature layout mismatch at position {position}: transformer produces {actual:?}, scoring contract expects {expected:?}"
    )]
    FeatureMismatch {
        /// First differing position.
        position: usize,
        /// Name expected by the scoring contract (None past its end).
        expected: Option<String>,
        /// Name produced by the transformer (None past its end).
        actual: Option<String>,
    },

    /// A required pipeline component was not supplied.
    #[error("missing pipeline component: {0}")]
    MissingComponent(&'static str),

    /// The configuration document could not be read or parsed.
    #[error("unreadable configuration: {0}")]
    Unreadable(String),
}

impl ConfigurationError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Stage-level error that fails a cycle.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Extract failed.
    #[error("{0}")]
    Source(#[from] SourceError),

    /// Score failed.
    #[error("{0}")]
    Scoring(#[from] ScoringError),

    /// Load failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Configuration problem surfaced at construction time.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The cycle was cancelled before Load began.
    #[error("cycle cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    /// Returns the operator-facing class of this error.
    #[must_use]
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::Source(e) => e.error_class(),
            Self::Scoring(e) => e.error_class(),
            Self::Store(_) => ErrorClass::StoreError,
            Self::Configuration(_) => ErrorClass::ConfigurationError,
            Self::Cancelled(_) => ErrorClass::Cancelled,
        }
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "error_class".to_string(),
            serde_json::json!(self.error_class().to_string()),
        );
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_display() {
        assert_eq!(ErrorClass::ValidationError.to_string(), "ValidationError");
        assert_eq!(
            ErrorClass::TransientDependencyError.to_string(),
            "TransientDependencyError"
        );
        assert_eq!(ErrorClass::StoreError.to_string(), "StoreError");
    }

    #[test]
    fn test_source_error_classes() {
        assert_eq!(
            SourceError::SourceUnavailable("reset".into()).error_class(),
            ErrorClass::TransientDependencyError
        );
        assert_eq!(
            SourceError::invalid_payload(3, None, "missing trans_num").error_class(),
            ErrorClass::ValidationError
        );
        assert_eq!(
            SourceError::MalformedResponse("not json".into()).error_class(),
            ErrorClass::PermanentDependencyError
        );
    }

    #[test]
    fn test_scoring_error_transient() {
        assert!(ScoringError::Transient("503".into()).is_transient());
        assert!(!ScoringError::Permanent("401".into()).is_transient());

        let exhausted = ScoringError::ScoringUnavailable {
            attempts: 4,
            last_error: "timeout".into(),
        };
        assert!(!exhausted.is_transient());
        assert!(exhausted.to_string().contains("4 attempts"));
    }

    #[test]
    fn test_pipeline_error_class_and_dict() {
        let err: PipelineError = StoreError::StoreUnavailable("connection refused".into()).into();
        assert_eq!(err.error_class(), ErrorClass::StoreError);

        let dict = err.to_dict();
        assert_eq!(dict.get("error_class").unwrap(), "StoreError");
        assert!(dict
            .get("message")
            .unwrap()
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn test_feature_mismatch_message() {
        let err = ConfigurationError::FeatureMismatch {
            position: 2,
            expected: Some("amt".into()),
            actual: Some("zip".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("position 2"));
        assert!(msg.contains("amt"));
    }
}
