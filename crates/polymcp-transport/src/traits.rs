//! The `Transport` trait and its supporting types.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportResult;
use crate::message::TransportMessage;

/// The transport kinds this crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Child process over stdin/stdout
    Stdio,
    /// Plain HTTP request/response
    Http,
    /// Streamable HTTP with a server-sent-events channel
    StreamableHttp,
    /// WebSocket
    WebSocket,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
            Self::StreamableHttp => write!(f, "streamable_http"),
            Self::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Connection state of one transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    /// Not connected
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Connected and usable
    Connected,
    /// Orderly shutdown in progress
    Disconnecting,
    /// Unrecoverable failure
    Failed {
        /// Failure description
        reason: String,
    },
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// One bidirectional channel to a server process or endpoint.
///
/// Methods take `&self`; implementations use interior mutability so a single
/// instance can be shared behind an `Arc` between the session's routing task
/// (the sole `receive()` consumer) and concurrent senders.
///
/// `receive()` parks until traffic arrives. `Ok(None)` means the inbound
/// channel closed (process exit, stream end, close frame) and no further
/// messages will come. A transport that failed or closed is discarded, never
/// reconnected in place; retry policy belongs to the layers above.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Which transport kind this is.
    fn transport_type(&self) -> TransportType;

    /// Current connection state.
    async fn state(&self) -> TransportState;

    /// Establish the connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError`] when the endpoint cannot be reached,
    /// including [`crate::TransportError::AuthRequired`] for 401-equivalents.
    async fn connect(&self) -> TransportResult<()>;

    /// Close the connection and release resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError`] when orderly shutdown fails; the
    /// transport is unusable afterwards either way.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError`] when the message cannot be written.
    async fn send(&self, message: TransportMessage) -> TransportResult<()>;

    /// Receive the next inbound message, or `None` once the channel closed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError`] for malformed inbound data; the
    /// channel may still deliver subsequent messages after such an error.
    async fn receive(&self) -> TransportResult<Option<TransportMessage>>;

    /// `true` while in the `Connected` state.
    async fn is_connected(&self) -> bool {
        matches!(self.state().await, TransportState::Connected)
    }

    /// Endpoint description for logs, if applicable.
    fn endpoint(&self) -> Option<String> {
        None
    }
}
