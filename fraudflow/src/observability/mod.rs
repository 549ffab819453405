//! Observability utilities: log subscriber setup and cycle counters.

mod metrics;
mod tracing;

pub use metrics::{CycleMetrics, MetricsSnapshot};
pub use tracing::{init_tracing, LogFormat, DEFAULT_FILTER};
