//! Operator events.
//!
//! The orchestrator and the alert dispatcher report what happened through an
//! [`EventSink`]. Event names are the constants below; payloads are JSON
//! objects carrying at least `cycle_id` or `trans_num`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::core::{CycleResult, CycleStage};
use serde_json::{json, Value};

/// A cycle left `Idle`.
pub const CYCLE_STARTED: &str = "cycle.started";
/// A stage finished successfully.
pub const CYCLE_STAGE_COMPLETED: &str = "cycle.stage_completed";
/// A cycle reached `Completed`.
pub const CYCLE_COMPLETED: &str = "cycle.completed";
/// A cycle reached `Failed`.
pub const CYCLE_FAILED: &str = "cycle.failed";
/// A trigger overlapped a running cycle.
pub const CYCLE_SKIPPED: &str = "cycle.skipped";
/// An alert was delivered.
pub const ALERT_SENT: &str = "alert.sent";
/// An alert could not be delivered.
pub const ALERT_FAILED: &str = "alert.failed";

/// Payload describing a whole cycle.
#[must_use]
pub fn cycle_payload(result: &CycleResult) -> Value {
    json!({
        "cycle_id": result.cycle_id.to_string(),
        "state": result.state,
        "counts": result.counts,
        "duration_ms": result.duration_ms(),
    })
}

/// Payload describing one finished stage.
#[must_use]
pub fn stage_payload(result: &CycleResult, stage: CycleStage) -> Value {
    json!({
        "cycle_id": result.cycle_id.to_string(),
        "stage": stage.to_string(),
        "counts": result.counts,
    })
}
