//! Core type definitions for the ferry socket.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normal closure.
pub const NORMAL_CLOSE_CODE: u16 = 1000;
/// Close frame that carried no status code.
pub const NO_STATUS_CODE: u16 = 1005;
/// Socket dropped or never connected.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;
/// The application is going away on purpose.
pub const APPLICATION_UNLOADING_CODE: u16 = 4001;

/// Reason sent with a close that names none.
pub const DEFAULT_CLOSE_REASON: &str = "application called close";

/// Whether a close with this code was intended and must not be retried.
pub fn is_intentional_close(code: u16) -> bool {
    code == NORMAL_CLOSE_CODE || code == APPLICATION_UNLOADING_CODE
}

/// Unique identifier for request-response correlation.
/// Uses ULID for lexicographically sortable, unique IDs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new unique request ID using ULID.
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies one socket among the successive ones a client opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionEpoch(pub u64);

impl ConnectionEpoch {
    pub(crate) fn bump(&mut self) -> Self {
        self.0 += 1;
        *self
    }
}

/// Connection state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket. A reconnect may be pending.
    #[default]
    Closed,
    /// Socket handshake in progress.
    Connecting,
    /// Ready for traffic.
    Open,
}

/// Snapshot of what the UI can observe about the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Whole seconds left before the next reconnect attempt, 0 if none.
    pub seconds_until_reconnect: u64,
}

impl ConnectionStatus {
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Less than two seconds until the next attempt.
    pub fn reconnect_imminent(&self) -> bool {
        self.seconds_until_reconnect < 2
    }
}
