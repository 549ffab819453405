//! Notification channels.

use super::AlertMessage;
use crate::errors::AlertError;
use async_trait::async_trait;
use tracing::info;

/// A fire-and-forget notification channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one alert.
    async fn send(&self, message: &AlertMessage) -> Result<(), AlertError>;
}

/// Writes alerts to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), AlertError> {
        info!(
            recipient = %message.recipient,
            trans_num = %message.trans_num,
            subject = %message.subject,
            "Fraud alert"
        );
        Ok(())
    }
}

#[cfg(feature = "http")]
pub use webhook::WebhookNotifier;

#[cfg(feature = "http")]
mod webhook {
    use super::{AlertError, AlertMessage, Notifier};
    use async_trait::async_trait;
    use serde_json::json;

    /// Posts alerts as JSON to a webhook.
    ///
    /// Each request carries an `Idempotency-Key` header that is stable per
    /// transaction.
    #[derive(Debug, Clone)]
    pub struct WebhookNotifier {
        client: reqwest::Client,
        url: String,
    }

    impl WebhookNotifier {
        /// Creates a notifier for `url`.
        #[must_use]
        pub fn new(url: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                url: url.into(),
            }
        }

        /// Replaces the HTTP client.
        #[must_use]
        pub fn with_client(mut self, client: reqwest::Client) -> Self {
            self.client = client;
            self
        }
    }

    #[async_trait]
    impl Notifier for WebhookNotifier {
        async fn send(&self, message: &AlertMessage) -> Result<(), AlertError> {
            let payload = json!({
                "recipient": message.recipient,
                "subject": message.subject,
                "body": message.body,
                "trans_num": message.trans_num,
            });
            let resp = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("X-Event-Type", "fraud.alert")
                .header("Idempotency-Key", &message.idempotency_key)
                .json(&payload)
                .send()
                .await
                .map_err(|e| AlertError::delivery(&message.trans_num, e.to_string()))?;

            let status = resp.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(AlertError::delivery(
                    &message.trans_num,
                    format!("webhook answered HTTP {}", status.as_u16()),
                ))
            }
        }
    }

}
