//! Payment source boundary.
//!
//! A source returns the events after a [`Cursor`], already validated. Rows
//! that fail validation are dropped and reported in [`FetchBatch::rejected`],
//! never propagated as a fetch error.

mod payload;
mod validation;

#[cfg(feature = "http")]
mod http;

pub use payload::{parse_split_payload, SplitPayload};
pub use validation::RecordValidator;

#[cfg(feature = "http")]
pub use http::HttpPaymentSource;

use crate::core::{Cursor, RawPaymentEvent};
use crate::errors::SourceError;
use async_trait::async_trait;

/// One fetched window of payment events.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    /// Valid events, ordered by event time.
    pub events: Vec<RawPaymentEvent>,
    /// Cursor to persist if the cycle completes.
    pub next_cursor: Cursor,
    /// Rows dropped by validation.
    pub rejected: Vec<SourceError>,
    /// Rows collapsed because their `trans_num` repeated within the batch.
    pub duplicates: usize,
}

impl FetchBatch {
    /// An empty window that leaves the cursor where it was.
    #[must_use]
    pub fn empty(since: Cursor) -> Self {
        Self {
            next_cursor: since,
            ..Self::default()
        }
    }

    /// Returns true if no valid events were fetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Pull interface over the upstream payments API.
#[async_trait]
pub trait PaymentSource: Send + Sync {
    /// Fetches at most `limit` events that `since` admits, ordered by event time then `trans_num`.
    ///
    /// An empty window is `Ok`. Transport failures are
    /// [`SourceError::SourceUnavailable`].
    async fn fetch(&self, since: &Cursor, limit: usize) -> Result<FetchBatch, SourceError>;
}
