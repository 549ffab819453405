//! HTTP inference backend.
//!
//! Rows are posted as `text/csv` without a header, the model identifier goes
//! in `X-Model-Id`. The response is either JSON (`{"probabilities": [...]}`,
//! `{"predictions": [...]}` or a bare array) or plain text with one float per
//! line or comma.

use super::{ScoringBackend, ScoringRequest};
use crate::config::PipelineConfig;
use crate::errors::ScoringError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Calls a remote inference endpoint.
#[derive(Debug, Clone)]
pub struct HttpScoringBackend {
    client: reqwest::Client,
    url: String,
    expected_features: Option<Vec<String>>,
}

impl HttpScoringBackend {
    /// Creates a backend from the pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.scoring.url.clone(),
            expected_features: config.scoring.expected_features.clone(),
        }
    }

    /// Replaces the HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

fn to_csv(instances: &[Vec<f64>]) -> String {
    let mut body = String::new();
    for row in instances {
        let line: Vec<String> = row.iter().map(ToString::to_string).collect();
        body.push_str(&line.join(","));
        body.push('\n');
    }
    body
}

fn classify_status(status: StatusCode, body: &str) -> ScoringError {
    let message = format!("HTTP {}: {body}", status.as_u16());
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        ScoringError::Transient(message)
    } else {
        ScoringError::Permanent(message)
    }
}

fn classify_transport(err: &reqwest::Error) -> ScoringError {
    if err.is_builder() || err.is_decode() {
        ScoringError::Permanent(err.to_string())
    } else {
        ScoringError::Transient(err.to_string())
    }
}

/// Parses an inference response body into probabilities.
pub fn parse_probabilities(body: &str) -> Result<Vec<f64>, ScoringError> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| ScoringError::Permanent(format!("unreadable scoring response: {e}")))?;
        let items = match &value {
            Value::Array(items) => Some(items),
            Value::Object(map) => match map.get("probabilities").or_else(|| map.get("predictions")) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            },
            _ => None,
        }
        .ok_or_else(|| ScoringError::Permanent("scoring response has no probabilities".to_string()))?;
        return items
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| ScoringError::Permanent(format!("non-numeric probability: {v}")))
            })
            .collect();
    }

    trimmed
        .split(|c: char| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| ScoringError::Permanent(format!("non-numeric probability: {s}")))
        })
        .collect()
}

#[async_trait]
impl ScoringBackend for HttpScoringBackend {
    async fn predict(&self, request: &ScoringRequest) -> Result<Vec<f64>, ScoringError> {
        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/csv")
            .header("Accept", "application/json")
            .header("X-Model-Id", &request.model_id)
            .body(to_csv(&request.instances))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| classify_transport(&e))?;
        if !status.is_success() {
            let excerpt: String = body.chars().take(200).collect();
            return Err(classify_status(status, &excerpt));
        }
        parse_probabilities(&body)
    }

    fn feature_contract(&self) -> Option<Vec<String>> {
        self.expected_features.clone()
    }
}
