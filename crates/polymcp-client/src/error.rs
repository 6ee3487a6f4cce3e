//! Client error types.

use std::time::Duration;

use thiserror::Error;

use polymcp_transport::TransportError;

use crate::session::SessionState;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by sessions, the registry, and the aggregation layer.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Underlying transport failure
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Server answered with a JSON-RPC error object
    #[error("Server error {code}: {message}")]
    Protocol {
        /// JSON-RPC error code
        code: i32,
        /// Server-supplied message
        message: String,
    },

    /// Initialize exchange failed or produced an unusable result
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Operation requires a ready session
    #[error("Session '{server}' is not ready (state: {state})")]
    NotReady {
        /// Server name the session belongs to
        server: String,
        /// State the session was in
        state: SessionState,
    },

    /// Requested state change is not a legal edge
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// State the session was in
        from: SessionState,
        /// State that was requested
        to: SessionState,
    },

    /// No configuration registered under this server name
    #[error("Unknown server: {0}")]
    UnknownServer(String),

    /// No live session exists for this server name
    #[error("No active session for server: {0}")]
    UnknownSession(String),

    /// Request exceeded its deadline; the response, if it ever arrives, is
    /// dropped by the routing task
    #[error("Request '{method}' timed out after {timeout:?}")]
    Timeout {
        /// Method that timed out
        method: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// Session shut down while an operation was in flight
    #[error("Session closed: {0}")]
    Closed(String),

    /// Endpoint demands authorization before the session can proceed
    #[error("Authorization required: {0}")]
    AuthRequired(String),

    /// Interactive authorization was refused or the token exchange failed
    #[error("Authorization denied: {0}")]
    AuthDenied(String),

    /// Invalid client or server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            // 401-equivalents drive the pending_auth flow, not failure
            TransportError::AuthRequired(msg) => Self::AuthRequired(msg),
            other => Self::Transport(other),
        }
    }
}
