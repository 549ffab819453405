//! Pipeline configuration.
//!
//! Read once at startup. Every field has a default so a partial JSON document
//! is enough; [`PipelineConfig::validate`] rejects unusable values before any
//! cycle runs.

mod features;

pub use features::{FeatureConfig, OneHotField};

use crate::errors::ConfigurationError;
use crate::pipeline::RetryConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the payment source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Endpoint returning the current payment batch.
    #[serde(default = "default_source_url")]
    pub url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
    /// Pattern every `trans_num` must match.
    #[serde(default = "default_trans_num_pattern")]
    pub trans_num_pattern: String,
}

fn default_source_url() -> String {
    "https://sdacelo-real-time-fraud-detection.hf.space/current-transactions".to_string()
}

fn default_source_timeout_ms() -> u64 {
    20_000
}

fn default_trans_num_pattern() -> String {
    r"^[A-Za-z0-9][A-Za-z0-9_\-]{0,127}$".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            timeout_ms: default_source_timeout_ms(),
            trans_num_pattern: default_trans_num_pattern(),
        }
    }
}

/// Configuration for the inference endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Inference endpoint URL.
    #[serde(default = "default_scoring_url")]
    pub url: String,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_scoring_timeout_ms")]
    pub timeout_ms: u64,
    /// Feature names the deployed model expects, in order.
    #[serde(default)]
    pub expected_features: Option<Vec<String>>,
}

fn default_scoring_url() -> String {
    "http://localhost:8080/invocations".to_string()
}

fn default_scoring_timeout_ms() -> u64 {
    5_000
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            url: default_scoring_url(),
            timeout_ms: default_scoring_timeout_ms(),
            expected_features: None,
        }
    }
}

/// Configuration for the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Timeout for a whole-cycle upsert in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    10_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Configuration for fraud alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Who receives alerts.
    #[serde(default = "default_recipient")]
    pub recipient: String,
    /// Webhook receiving rendered alerts.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Per-send timeout in milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_recipient() -> String {
    "fraud-alerts".to_string()
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            recipient: default_recipient(),
            webhook_url: None,
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Probability at or above which a payment is flagged.
    #[serde(default = "default_threshold")]
    pub fraud_threshold: f64,
    /// Model identifier sent to the inference service.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Records per scoring request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Scoring requests in flight at once.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    /// Maximum records fetched per cycle.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Seconds between scheduled cycles.
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    /// Retry policy for dependency calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Payment source settings.
    #[serde(default)]
    pub source: SourceConfig,
    /// Inference endpoint settings.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Durable store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Alert settings.
    #[serde(default)]
    pub alerts: AlertConfig,
    /// Feature layout.
    #[serde(default)]
    pub features: FeatureConfig,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_model_id() -> String {
    "xgb-rt".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_window_size() -> usize {
    500
}

fn default_schedule_interval_secs() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fraud_threshold: default_threshold(),
            model_id: default_model_id(),
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            window_size: default_window_size(),
            schedule_interval_secs: default_schedule_interval_secs(),
            retry: RetryConfig::default(),
            source: SourceConfig::default(),
            scoring: ScoringConfig::default(),
            store: StoreConfig::default(),
            alerts: AlertConfig::default(),
            features: FeatureConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fraud threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.fraud_threshold = threshold;
        self
    }

    /// Sets the scoring batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::Unreadable(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Unreadable(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Checks every value. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=1.0).contains(&self.fraud_threshold) {
            return Err(ConfigurationError::ThresholdOutOfRange(self.fraud_threshold));
        }
        if self.model_id.trim().is_empty() {
            return Err(ConfigurationError::invalid("model_id", "must not be empty"));
        }
        require_positive("batch_size", self.batch_size)?;
        require_positive("max_concurrent_batches", self.max_concurrent_batches)?;
        require_positive("window_size", self.window_size)?;
        require_positive_u64("schedule_interval_secs", self.schedule_interval_secs)?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid(
                "retry.max_attempts",
                "must allow at least one attempt",
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::invalid(
                "retry.base_delay_ms",
                format!(
                    "base delay {}ms exceeds cap {}ms",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            ));
        }

        require_positive_u64("source.timeout_ms", self.source.timeout_ms)?;
        require_positive_u64("scoring.timeout_ms", self.scoring.timeout_ms)?;
        require_positive_u64("store.timeout_ms", self.store.timeout_ms)?;
        require_positive_u64("alerts.send_timeout_ms", self.alerts.send_timeout_ms)?;
        if self.alerts.recipient.trim().is_empty() {
            return Err(ConfigurationError::invalid("alerts.recipient", "must not be empty"));
        }
        Regex::new(&self.source.trans_num_pattern).map_err(|e| {
            ConfigurationError::invalid("source.trans_num_pattern", e.to_string())
        })?;

        self.features.validate()
    }

    /// Returns the scoring timeout.
    #[must_use]
    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_millis(self.scoring.timeout_ms)
    }

    /// Returns the source timeout.
    #[must_use]
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source.timeout_ms)
    }

    /// Returns the store timeout.
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    /// Returns the per-alert send timeout.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.alerts.send_timeout_ms)
    }

    /// Returns the schedule interval.
    #[must_use]
    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }
}

fn require_positive(field: &str, value: usize) -> Result<(), ConfigurationError> {
    if value == 0 {
        return Err(ConfigurationError::invalid(field, "must be greater than zero"));
    }
    Ok(())
}

fn require_positive_u64(field: &str, value: u64) -> Result<(), ConfigurationError> {
    if value == 0 {
        return Err(ConfigurationError::invalid(field, "must be greater than zero"));
    }
    Ok(())
}
