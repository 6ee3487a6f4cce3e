//! Transport error types.

use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by transport implementations.
///
/// Variants carry strings rather than source errors so values stay `Clone`
/// and can be stored in [`crate::TransportState::Failed`] snapshots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Failed to establish a connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed or lost unexpectedly
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to send a message
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a message
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Message could not be serialized or deserialized
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Remote endpoint violated the expected protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation exceeded its time bound
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Endpoint demands authorization (HTTP 401/403-equivalent).
    ///
    /// The session layer maps this to its `pending_auth` state rather than
    /// treating it as fatal.
    #[error("Authorization required: {0}")]
    AuthRequired(String),

    /// Operation attempted while not connected
    #[error("Transport not connected: {0}")]
    NotConnected(String),

    /// Invalid transport configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Message exceeds the configured size limit
    #[error("Message too large: {size} bytes exceeds limit of {max} bytes")]
    MessageTooLarge {
        /// Actual message size in bytes
        size: usize,
        /// Configured limit in bytes
        max: usize,
    },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}
