//! Pending request management.
//!
//! Tracks correlated requests from the moment they are sent until exactly
//! one terminal event consumes them: the matching reply or a connection
//! close. Owned by the connection task alone, so a plain map suffices.

use std::{collections::HashMap, time::Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::types::RequestId;
use crate::error::{TransportError, TransportResult};

/// Completion side of a correlated request.
pub type ReplySender = oneshot::Sender<TransportResult<Value>>;

/// A pending request awaiting a response.
pub struct PendingRequest {
    /// Channel to send the response.
    pub reply_tx: ReplySender,
    /// When this request was registered.
    pub created_at: Instant,
}

/// Outstanding requests keyed by correlation id.
#[derive(Default)]
pub struct CorrelationTable {
    requests: HashMap<RequestId, PendingRequest>,
}

impl CorrelationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a completion under `id`.
    ///
    /// An id that is already outstanding is refused: the new completion is
    /// rejected straight away and the existing entry is left alone.
    pub fn register(&mut self, id: RequestId, reply_tx: ReplySender) -> bool {
        if self.requests.contains_key(&id) {
            let _ = reply_tx.send(Err(TransportError::duplicate_request_id(id.as_str())));
            return false;
        }

        self.requests.insert(
            id,
            PendingRequest {
                reply_tx,
                created_at: Instant::now(),
            },
        );
        true
    }

    /// Resolve a pending request with a reply.
    ///
    /// Returns `true` if the request was found, `false` otherwise.
    pub fn resolve(&mut self, id: &RequestId, value: Value) -> bool {
        self.complete(id, Ok(value))
    }

    /// Reject a pending request.
    ///
    /// Returns `true` if the request was found, `false` otherwise.
    pub fn reject(&mut self, id: &RequestId, error: TransportError) -> bool {
        self.complete(id, Err(error))
    }

    fn complete(&mut self, id: &RequestId, outcome: TransportResult<Value>) -> bool {
        let Some(pending) = self.requests.remove(id) else {
            return false;
        };
        debug!(
            request_id = %id,
            elapsed_ms = pending.created_at.elapsed().as_millis(),
            ok = outcome.is_ok(),
            "Request completed"
        );
        // The caller may have dropped its handle; the entry is consumed either way.
        let _ = pending.reply_tx.send(outcome);
        true
    }

    /// Reject every outstanding request with a connection-closed error.
    ///
    /// Returns how many requests were rejected. The table is empty afterwards.
    pub fn reject_all(&mut self, reason: &str) -> usize {
        let rejected = self.requests.len();
        for (_, pending) in self.requests.drain() {
            let _ = pending
                .reply_tx
                .send(Err(TransportError::connection_closed(reason)));
        }
        rejected
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    /// Get the current number of pending requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
