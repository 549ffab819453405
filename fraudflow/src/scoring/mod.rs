//! Scoring boundary: the inference backend seam, the retrying batch client
//! and threshold classification.

mod client;
mod threshold;

#[cfg(feature = "http")]
mod http;

pub use client::{ProbabilityScore, ScoringClient};
pub use threshold::{classify, FraudThreshold};

#[cfg(feature = "http")]
pub use http::{parse_probabilities, HttpScoringBackend};

use crate::errors::ScoringError;
use async_trait::async_trait;
use std::sync::Arc;

/// One request to the inference service.
#[derive(Debug, Clone)]
pub struct ScoringRequest {
    /// Model identifier.
    pub model_id: String,
    /// Feature names, shared by every request of a cycle.
    pub feature_names: Arc<[String]>,
    /// Transactions, aligned with `instances`.
    pub trans_nums: Vec<String>,
    /// Feature rows.
    pub instances: Vec<Vec<f64>>,
}

impl ScoringRequest {
    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if the request carries no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// The external inference service.
///
/// Implementations return one probability per instance, in order, and must
/// report retryable failures as [`ScoringError::Transient`].
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Scores a batch.
    async fn predict(&self, request: &ScoringRequest) -> Result<Vec<f64>, ScoringError>;

    /// Feature names the deployed model expects, if the backend knows them.
    fn feature_contract(&self) -> Option<Vec<String>> {
        None
    }
}
