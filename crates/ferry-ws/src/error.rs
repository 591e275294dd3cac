//! Error handling for the ferry client.

use thiserror::Error;

/// The main result type used throughout the client.
pub type TransportResult<T> = Result<T, TransportError>;

/// Every failure the client can surface.
///
/// Most of these never escape the connection task: they are logged there.
/// The ones a caller actually sees arrive through a rejected
/// [`ReplyHandle`](crate::websocket::ReplyHandle) or a failed constructor.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The socket could not even be created (bad URL, bad request).
    /// Never retried.
    #[error("Failed to establish socket: {message}")]
    Establish { message: String },

    /// An inbound frame was not valid JSON.
    #[error("Failed to decode frame: {message}")]
    Decode { message: String },

    /// The connection closed before a reply arrived, or was not open.
    #[error("Connection closed: {reason}")]
    ConnectionClosed { reason: String },

    /// The server answered a request with an error field.
    #[error("Server error: {reason}")]
    Server { reason: String },

    /// A request id collided with one that is still outstanding.
    #[error("Duplicate request id: {id}")]
    DuplicateRequestId { id: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WebSocket errors
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket {
            message: e.to_string(),
        }
    }
}

impl TransportError {
    /// Create a socket establishment error.
    pub fn establish(message: impl Into<String>) -> Self {
        Self::Establish {
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a connection closed error.
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Create a server-reported error.
    pub fn server(reason: impl Into<String>) -> Self {
        Self::Server {
            reason: reason.into(),
        }
    }

    /// Create a duplicate request id error.
    pub fn duplicate_request_id(id: impl Into<String>) -> Self {
        Self::DuplicateRequestId { id: id.into() }
    }

    /// Create a WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The server's failure detail, if this is a server-reported error.
    pub fn server_reason(&self) -> Option<&str> {
        match self {
            Self::Server { reason } => Some(reason),
            _ => None,
        }
    }

    /// Check if this error came from the connection going away.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TransportError::config("Invalid URL");
        assert!(matches!(err, TransportError::Config { .. }));

        let err = TransportError::connection_closed("Socket disconnected");
        assert!(err.is_connection_closed());

        let err = TransportError::establish("relative URL without a base");
        assert!(matches!(err, TransportError::Establish { .. }));
    }

    #[test]
    fn test_server_reason() {
        let err = TransportError::server("stale version");
        assert_eq!(err.server_reason(), Some("stale version"));
        assert_eq!(err.to_string(), "Server error: stale version");

        let err = TransportError::decode("expected value");
        assert_eq!(err.server_reason(), None);
    }

    #[test]
    fn test_serde_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: TransportError = parse.unwrap_err().into();
        assert!(matches!(err, TransportError::Serialization(_)));
    }

    #[test]
    fn test_websocket_conversion() {
        let err: TransportError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, TransportError::WebSocket { .. }));
    }
}
