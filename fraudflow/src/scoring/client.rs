//! Batch scoring with timeout, retry and concurrency bounds.

use super::{ScoringBackend, ScoringRequest};
use crate::config::PipelineConfig;
use crate::core::FeatureVector;
use crate::errors::ScoringError;
use crate::pipeline::{with_retry, RetryConfig};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A probability returned for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityScore {
    /// Transaction scored.
    pub trans_num: String,
    /// Fraud probability in `[0, 1]`.
    pub probability: f64,
}

/// Scores feature vectors against a [`ScoringBackend`].
///
/// Vectors are split into sub-batches of `batch_size`, scored with at most
/// `max_concurrent` requests in flight, and joined in input order. Any
/// sub-batch failure fails the whole call, so callers never see a partial
/// result.
#[derive(Clone)]
pub struct ScoringClient {
    backend: Arc<dyn ScoringBackend>,
    model_id: String,
    feature_names: Arc<[String]>,
    batch_size: usize,
    max_concurrent: usize,
    timeout: Duration,
    retry: RetryConfig,
}

impl std::fmt::Debug for ScoringClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringClient")
            .field("model_id", &self.model_id)
            .field("features", &self.feature_names.len())
            .field("batch_size", &self.batch_size)
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ScoringClient {
    /// Creates a client from the pipeline configuration.
    pub fn new(backend: Arc<dyn ScoringBackend>, config: &PipelineConfig, feature_names: &[String]) -> Self {
        Self {
            backend,
            model_id: config.model_id.clone(),
            feature_names: feature_names.into(),
            batch_size: config.batch_size.max(1),
            max_concurrent: config.max_concurrent_batches.max(1),
            timeout: config.scoring_timeout(),
            retry: config.retry.clone(),
        }
    }

    /// Returns the model identifier sent with each request.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Scores every vector, or fails as a whole.
    pub async fn score(&self, vectors: &[FeatureVector]) -> Result<Vec<ProbabilityScore>, ScoringError> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<ScoringRequest> = vectors
            .chunks(self.batch_size)
            .map(|chunk| self.request_for(chunk))
            .collect();

        debug!(
            vectors = vectors.len(),
            sub_batches = requests.len(),
            "Scoring batch"
        );

        let chunks: Vec<Vec<ProbabilityScore>> = stream::iter(requests.iter().map(|r| self.score_chunk(r)))
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        Ok(chunks.into_iter().flatten().collect())
    }

    fn request_for(&self, chunk: &[FeatureVector]) -> ScoringRequest {
        ScoringRequest {
            model_id: self.model_id.clone(),
            feature_names: Arc::clone(&self.feature_names),
            trans_nums: chunk.iter().map(|v| v.trans_num.clone()).collect(),
            instances: chunk.iter().map(|v| v.values.clone()).collect(),
        }
    }

    async fn score_chunk(&self, request: &ScoringRequest) -> Result<Vec<ProbabilityScore>, ScoringError> {
        let backend = &self.backend;
        let timeout = self.timeout;

        let outcome = with_retry(&self.retry, "scoring.predict", move || async move {
            match tokio::time::timeout(timeout, backend.predict(request)).await {
                Ok(result) => result,
                Err(_) => Err(ScoringError::Transient(format!(
                    "scoring call timed out after {}ms",
                    timeout.as_millis()
                ))),
            }
        })
        .await;

        let probabilities = match outcome {
            Ok(p) => p,
            Err(failure) if failure.exhausted => {
                warn!(attempts = failure.attempts, error = %failure.error, "Scoring unavailable");
                return Err(ScoringError::ScoringUnavailable {
                    attempts: failure.attempts,
                    last_error: failure.error.to_string(),
                });
            }
            Err(failure) => return Err(failure.error),
        };

        if probabilities.len() != request.len() {
            return Err(ScoringError::Permanent(format!(
                "expected {} probabilities, got {}",
                request.len(),
                probabilities.len()
            )));
        }

        request
            .trans_nums
            .iter()
            .zip(probabilities)
            .map(|(trans_num, probability)| {
                if (0.0..=1.0).contains(&probability) {
                    Ok(ProbabilityScore {
                        trans_num: trans_num.clone(),
                        probability,
                    })
                } else {
                    Err(ScoringError::Permanent(format!(
                        "probability {probability} for {trans_num} is outside [0, 1]"
                    )))
                }
            })
            .collect()
    }
}
