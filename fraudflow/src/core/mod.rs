//! Core domain model types for fraudflow.
//!
//! This module contains the data contracts passed between stages:
//! - Raw payment events and the scored, durable row
//! - Feature vectors and per-record transform outcomes
//! - The cycle state machine, cursor and cycle summary

mod cycle;
mod features;
mod payment;

pub use cycle::{CycleCounts, CycleResult, CycleStage, CycleState, Cursor};
pub use features::{FeatureVector, SkipReason, SkippedRecord, TransformOutcome};
pub use payment::{
    cast_f64, cast_i64, PaymentSnapshot, RawPaymentEvent, ScoredPayment, AMOUNT_FIELD,
    EVENT_TIME_FIELD, TRANS_NUM_FIELD,
};
