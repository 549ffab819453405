//! Cooperative cancellation for cycles and the scheduler loop.
//!
//! A cycle checks the token between stages. Once Load has begun the cycle
//! runs to a terminal state, so cancellation never leaves a half-written
//! batch behind.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Token for coordinating cancellation across tasks.
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    callbacks: Mutex<Vec<Box<dyn FnOnce(String) + Send>>>,
    notify: Notify,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .field("reason", &self.reason.lock())
            .finish()
    }
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Requests cancellation with a reason.
    ///
    /// Idempotent: only the first reason is stored.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();

        if !self.cancelled.swap(true, Ordering::SeqCst) {
            *self.reason.lock() = Some(reason.clone());

            let callbacks: Vec<_> = {
                let mut lock = self.callbacks.lock();
                std::mem::take(&mut *lock)
            };

            for callback in callbacks {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback(reason.clone());
                }))
                .is_err()
                {
                    tracing::warn!("Cancellation callback panicked");
                }
            }

            self.notify.notify_waiters();
        }
    }

    /// Registers a callback to run when cancellation is requested.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_default();
            callback(reason);
        } else {
            self.callbacks.lock().push(Box::new(callback));
        }
    }

    /// Waits until cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            reason: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }
}
