//! Periodic cycle triggering and cursor persistence.

use crate::core::{Cursor, CycleResult};
use crate::errors::StoreError;
use crate::pipeline::{CancellationToken, Pipeline};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Durable home of the source cursor between cycles.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Loads the last saved cursor, or [`Cursor::start`] if none exists.
    async fn load(&self) -> Result<Cursor, StoreError>;

    /// Replaces the saved cursor.
    async fn save(&self, cursor: &Cursor) -> Result<(), StoreError>;
}

/// Cursor kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursor: parking_lot::Mutex<Cursor>,
}

impl InMemoryCursorStore {
    /// Creates a store holding `cursor`.
    #[must_use]
    pub fn new(cursor: Cursor) -> Self {
        Self {
            cursor: parking_lot::Mutex::new(cursor),
        }
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn load(&self) -> Result<Cursor, StoreError> {
        Ok(self.cursor.lock().clone())
    }

    async fn save(&self, cursor: &Cursor) -> Result<(), StoreError> {
        *self.cursor.lock() = cursor.clone();
        Ok(())
    }
}

/// Cursor stored as a small JSON document.
///
/// Saves write a sibling temporary file and rename it over the target, so a
/// crash mid-write leaves the previous cursor intact.
#[derive(Debug, Clone)]
pub struct JsonFileCursorStore {
    path: PathBuf,
}

impl JsonFileCursorStore {
    /// Creates a store at `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> StoreError {
    StoreError::StoreUnavailable(format!("{}: {err}", path.display()))
}

#[async_trait]
impl CursorStore for JsonFileCursorStore {
    async fn load(&self) -> Result<Cursor, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StoreError::Rejected(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Cursor::start()),
            Err(e) => Err(io_error(&self.path, &e)),
        }
    }

    async fn save(&self, cursor: &Cursor) -> Result<(), StoreError> {
        let body = serde_json::to_vec(cursor).map_err(|e| StoreError::Rejected(e.to_string()))?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| io_error(&tmp, &e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, &e))
    }
}

/// Triggers [`Pipeline::run_one_cycle`] on a fixed interval.
///
/// Ticks that fall due while a cycle is still running are dropped rather
/// than queued.
pub struct CycleScheduler {
    pipeline: Arc<Pipeline>,
    cursors: Arc<dyn CursorStore>,
    interval: Duration,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for CycleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleScheduler")
            .field("interval", &self.interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CycleScheduler {
    /// Creates a scheduler using the pipeline's configured interval and
    /// cancellation token.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>, cursors: Arc<dyn CursorStore>) -> Self {
        let interval = pipeline.config().schedule_interval();
        let cancel = Arc::clone(pipeline.cancellation_token());
        Self {
            pipeline,
            cursors,
            interval,
            cancel,
        }
    }

    /// Overrides the trigger interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs a single cycle from the saved cursor and persists the new cursor
    /// if the cycle completed.
    pub async fn run_once(&self) -> Result<CycleResult, StoreError> {
        let cursor = self.cursors.load().await?;
        let (next, result) = self.pipeline.run_one_cycle(&cursor).await;
        if result.is_completed() && next != cursor {
            self.cursors.save(&next).await?;
            debug!(
                cycle_id = %result.cycle_id,
                watermark = ?next.watermark_ms,
                last_trans_num = ?next.last_trans_num,
                "Cursor saved"
            );
        }
        Ok(result)
    }

    /// Runs cycles until the cancellation token fires.
    ///
    /// The first cycle starts immediately. A cycle already in progress when
    /// cancellation arrives stops at its next cancellation point.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Cursor store failed, cycle result not persisted");
                    }
                }
            }
        }

        info!(reason = ?self.cancel.reason(), "Scheduler stopped");
    }
}
