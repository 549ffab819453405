//! Testing utilities for fraudflow pipelines.
//!
//! This module provides:
//! - Scriptable fakes for the source, scoring backend, store, ledger and notifier
//! - Sample payment rows and scored rows

mod fixtures;
mod mocks;

pub use fixtures::{sample_event, sample_row, scored_payment, TEST_MODEL_ID};
pub use mocks::{
    FailingAlertLedger, FailingStore, RecordingNotifier, ScriptedScoringBackend, ScriptedSource,
};
