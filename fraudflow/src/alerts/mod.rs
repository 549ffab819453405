//! Fraud alerting: rendering, delivery and the dedup ledger.

mod dispatcher;
mod ledger;
mod notifier;
mod render;

pub use dispatcher::{AlertDispatcher, DispatchReport};
pub use ledger::{AlertLedger, InMemoryAlertLedger};
pub use notifier::{LoggingNotifier, Notifier};
pub use render::{alert_idempotency_key, render_alert, AlertMessage};

#[cfg(feature = "http")]
pub use notifier::WebhookNotifier;
