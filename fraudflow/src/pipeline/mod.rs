//! Pipeline building and execution.
//!
//! This module provides:
//! - The validated [`Pipeline`] and its builder
//! - Single-cycle execution with the cycle state machine
//! - Interval scheduling with persisted cursors
//! - Retry with backoff and cooperative cancellation

mod cancellation;
mod orchestrator;
mod retry;
mod scheduler;

#[cfg(test)]
mod integration_tests;

pub use cancellation::CancellationToken;
pub use orchestrator::{Pipeline, PipelineBuilder};
pub use retry::{
    decide, with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryFailure,
    Retryable,
};
pub use scheduler::{CursorStore, CycleScheduler, InMemoryCursorStore, JsonFileCursorStore};
