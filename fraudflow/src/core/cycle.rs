//! Cycle state machine, source cursor and the per-cycle summary.

use crate::errors::ErrorClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The five stages of a cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    /// Fetch raw events from the source.
    Extract,
    /// Build feature vectors.
    Transform,
    /// Call the inference service and classify.
    Score,
    /// Upsert scored rows.
    Load,
    /// Notify on newly flagged rows.
    Alert,
}

impl CycleStage {
    /// All stages in order.
    pub const ALL: [Self; 5] = [
        Self::Extract,
        Self::Transform,
        Self::Score,
        Self::Load,
        Self::Alert,
    ];

    /// Returns the state a cycle is in while running this stage.
    #[must_use]
    pub fn running_state(self) -> CycleState {
        match self {
            Self::Extract => CycleState::Extracting,
            Self::Transform => CycleState::Transforming,
            Self::Score => CycleState::Scoring,
            Self::Load => CycleState::Loading,
            Self::Alert => CycleState::Alerting,
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extract => write!(f, "extract"),
            Self::Transform => write!(f, "transform"),
            Self::Score => write!(f, "score"),
            Self::Load => write!(f, "load"),
            Self::Alert => write!(f, "alert"),
        }
    }
}

/// State of one cycle.
///
/// Transitions are strictly forward:
/// `Idle → Extracting → Transforming → Scoring → Loading → Alerting → Completed`.
/// `Failed` is reachable from any non-terminal state. `Skipped` is only
/// reachable from `Idle` and means the trigger overlapped a running cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CycleState {
    /// Not started.
    #[default]
    Idle,
    /// Fetching.
    Extracting,
    /// Transforming.
    Transforming,
    /// Scoring.
    Scoring,
    /// Loading.
    Loading,
    /// Alerting.
    Alerting,
    /// Finished successfully.
    Completed,
    /// Abandoned at a stage.
    Failed {
        /// Stage that failed.
        stage: CycleStage,
        /// Operator-facing error class.
        error_class: ErrorClass,
        /// Error message.
        message: String,
    },
    /// Another cycle was in flight; nothing ran.
    Skipped,
}

impl CycleState {
    fn ordinal(&self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Extracting => Some(1),
            Self::Transforming => Some(2),
            Self::Scoring => Some(3),
            Self::Loading => Some(4),
            Self::Alerting => Some(5),
            Self::Completed => Some(6),
            Self::Failed { .. } | Self::Skipped => None,
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Skipped)
    }

    /// Returns true if the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed { .. } => true,
            Self::Skipped => matches!(self, Self::Idle),
            _ => match (self.ordinal(), next.ordinal()) {
                (Some(from), Some(to)) => to == from + 1,
                _ => false,
            },
        }
    }

    /// Returns a short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Transforming => "transforming",
            Self::Scoring => "scoring",
            Self::Loading => "loading",
            Self::Alerting => "alerting",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed {
                stage,
                error_class,
                message,
            } => write!(f, "failed({stage}, {error_class}: {message})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Source position a cycle fetches from.
///
/// Events are ordered by `(event_time, trans_num)`. A cursor set with
/// [`Cursor::at`] is inclusive of its watermark. Once a cycle has consumed
/// events the cursor also carries the last `trans_num` taken at the
/// watermark, and only strictly later positions are admitted, so a window
/// filled entirely by events sharing one timestamp still moves forward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Highest event time seen by the last successful cycle, in epoch millis.
    pub watermark_ms: Option<i64>,
    /// Last transaction consumed at `watermark_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trans_num: Option<String>,
}

impl Cursor {
    /// A cursor that admits every event.
    #[must_use]
    pub fn start() -> Self {
        Self::default()
    }

    /// A cursor admitting events at or after `watermark_ms`.
    #[must_use]
    pub fn at(watermark_ms: i64) -> Self {
        Self {
            watermark_ms: Some(watermark_ms),
            last_trans_num: None,
        }
    }

    /// A cursor admitting events strictly after `(watermark_ms, trans_num)`.
    #[must_use]
    pub fn after(watermark_ms: i64, trans_num: impl Into<String>) -> Self {
        Self {
            watermark_ms: Some(watermark_ms),
            last_trans_num: Some(trans_num.into()),
        }
    }

    /// Returns true if the event at `(event_time, trans_num)` belongs to the window.
    #[must_use]
    pub fn admits(&self, event_time: i64, trans_num: &str) -> bool {
        match (self.watermark_ms, self.last_trans_num.as_deref()) {
            (None, _) => true,
            (Some(w), None) => event_time >= w,
            (Some(w), Some(last)) => (event_time, trans_num) > (w, last),
        }
    }

    /// Returns the cursor moved past `(event_time, trans_num)`, never backwards.
    #[must_use]
    pub fn advanced_to(self, event_time: i64, trans_num: &str) -> Self {
        if self.admits(event_time, trans_num) {
            Self::after(event_time, trans_num)
        } else {
            self
        }
    }
}

/// Record counts gathered during a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounts {
    /// Valid events returned by the source.
    pub extracted: usize,
    /// Records dropped by source validation.
    pub rejected: usize,
    /// Repeated `trans_num` values collapsed within the batch.
    pub duplicates: usize,
    /// Events turned into feature vectors.
    pub transformed: usize,
    /// Events skipped by the transformer.
    pub skipped: usize,
    /// Probabilities received.
    pub scored: usize,
    /// Rows at or above the threshold.
    pub flagged: usize,
    /// Rows written by the store.
    pub loaded: usize,
    /// Alerts sent this cycle.
    pub alerted: usize,
    /// Flagged rows already present in the ledger.
    pub already_alerted: usize,
    /// Alerts that failed to send.
    pub alert_failures: usize,
}

/// Summary of one cycle, created at cycle start and discarded after reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    /// Unique cycle identifier.
    pub cycle_id: Uuid,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// When the cycle reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Current state.
    pub state: CycleState,
    /// Every state visited, in order, starting at `Idle`.
    pub transitions: Vec<CycleState>,
    /// Record counts.
    pub counts: CycleCounts,
}

impl CycleResult {
    /// Creates a result in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cycle_id: Uuid::now_v7(),
            started_at: Utc::now(),
            ended_at: None,
            state: CycleState::Idle,
            transitions: vec![CycleState::Idle],
            counts: CycleCounts::default(),
        }
    }

    /// Moves to `next`. Returns false, leaving the state untouched, if the
    /// transition is not allowed.
    pub fn advance(&mut self, next: CycleState) -> bool {
        if !self.state.can_transition_to(&next) {
            tracing::error!(
                cycle_id = %self.cycle_id,
                from = %self.state,
                to = %next,
                "Rejected illegal cycle transition"
            );
            return false;
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.transitions.push(next.clone());
        self.state = next;
        true
    }

    /// Returns true if the cycle completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.state, CycleState::Completed)
    }

    /// Returns true if the cycle failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.state, CycleState::Failed { .. })
    }

    /// Returns true if the cycle was skipped due to overlap.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self.state, CycleState::Skipped)
    }

    /// Returns the failed stage, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<CycleStage> {
        match &self.state {
            CycleState::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the failure class, if any.
    #[must_use]
    pub fn error_class(&self) -> Option<ErrorClass> {
        match &self.state {
            CycleState::Failed { error_class, .. } => Some(*error_class),
            _ => None,
        }
    }

    /// Returns the duration in milliseconds, measured to now if still running.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_ms(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64
    }
}

impl Default for CycleResult {
    fn default() -> Self {
        Self::new()
    }
}
