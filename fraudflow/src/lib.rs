//! # Fraudflow
//!
//! A scheduled fraud-scoring pipeline engine.
//!
//! Every cycle pulls a window of payment events from a source, turns them into
//! fixed-layout feature vectors, scores them against a remote model, upserts
//! the scored rows idempotently and alerts once per newly flagged transaction:
//!
//! - **Cycle state machine**: strictly forward stages with a single terminal state
//! - **Idempotent load**: replaying a window never duplicates rows
//! - **Deduplicated alerts**: a ledger guarantees at most one alert per transaction
//! - **Retry with backoff**: transient dependency failures are retried, permanent ones are not
//! - **Single-flight scheduling**: overlapping triggers are skipped, never queued
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fraudflow::prelude::*;
//!
//! let config = PipelineConfig::from_file("fraudflow.json")?;
//! let pipeline = Pipeline::builder(config)
//!     .with_http_defaults()?
//!     .with_store(Arc::new(InMemoryScoredPaymentStore::new()))
//!     .with_ledger(Arc::new(InMemoryAlertLedger::new()))
//!     .build()?;
//!
//! let scheduler = CycleScheduler::new(Arc::new(pipeline), Arc::new(JsonFileCursorStore::new("cursor.json")));
//! scheduler.run().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod alerts;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod scoring;
pub mod source;
pub mod store;
pub mod testing;
pub mod transform;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::alerts::{
        AlertDispatcher, AlertLedger, AlertMessage, InMemoryAlertLedger, LoggingNotifier,
        Notifier,
    };
    pub use crate::config::{FeatureConfig, PipelineConfig};
    pub use crate::core::{
        Cursor, CycleResult, CycleStage, CycleState, RawPaymentEvent, ScoredPayment,
    };
    pub use crate::errors::{
        AlertError, ConfigurationError, ErrorClass, PipelineError, ScoringError, SourceError,
        StoreError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, CycleMetrics, LogFormat};
    pub use crate::pipeline::{
        CancellationToken, CursorStore, CycleScheduler, InMemoryCursorStore,
        JsonFileCursorStore, Pipeline, PipelineBuilder, RetryConfig,
    };
    pub use crate::scoring::{FraudThreshold, ScoringBackend};
    pub use crate::source::PaymentSource;
    pub use crate::store::{DailyReport, InMemoryScoredPaymentStore, ScoredPaymentStore};
}
