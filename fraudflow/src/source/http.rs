//! HTTP client for the upstream payments API.

use super::{parse_split_payload, FetchBatch, PaymentSource, RecordValidator};
use crate::config::PipelineConfig;
use crate::core::Cursor;
use crate::errors::{ConfigurationError, SourceError};
use crate::pipeline::{with_retry, RetryConfig};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Fetches the current payment window over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPaymentSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    validator: RecordValidator,
    retry: RetryConfig,
}

impl HttpPaymentSource {
    /// Creates a source from the pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client: reqwest::Client::new(),
            url: config.source.url.clone(),
            timeout: config.source_timeout(),
            validator: RecordValidator::from_config(&config.source)?,
            retry: config.retry.clone(),
        })
    }

    /// Replaces the HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn fetch_body(&self) -> Result<String, SourceError> {
        let resp = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SourceError::SourceUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body: String = resp.text().await.unwrap_or_default().chars().take(200).collect();
            return Err(classify_status(status, &body));
        }

        resp.text()
            .await
            .map_err(|e| SourceError::SourceUnavailable(e.to_string()))
    }
}

fn classify_status(status: StatusCode, body: &str) -> SourceError {
    let message = format!("HTTP {}: {body}", status.as_u16());
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        SourceError::SourceUnavailable(message)
    } else {
        SourceError::MalformedResponse(message)
    }
}

#[async_trait]
impl PaymentSource for HttpPaymentSource {
    async fn fetch(&self, since: &Cursor, limit: usize) -> Result<FetchBatch, SourceError> {
        let body = with_retry(&self.retry, "source.fetch", move || self.fetch_body())
            .await
            .map_err(|failure| failure.error)?;

        let rows = parse_split_payload(&body)?;
        Ok(self.validator.build_batch(rows, since, limit))
    }
}
