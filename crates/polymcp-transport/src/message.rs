//! Transport message wrapper.

use bytes::Bytes;
use polymcp_protocol::MessageId;
use uuid::Uuid;

/// A raw message crossing a transport, JSON-RPC payload plus a local tag.
///
/// The `id` identifies the message within the transport layer only; request
/// correlation happens above, on the JSON-RPC `id` inside the payload.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    /// Transport-local identifier
    pub id: MessageId,
    /// Serialized JSON-RPC payload
    pub payload: Bytes,
}

impl TransportMessage {
    /// Wrap a payload with the given id.
    pub fn new(id: MessageId, payload: Bytes) -> Self {
        Self { id, payload }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Payload as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::SerializationFailed`] for non-UTF-8
    /// payloads.
    pub fn as_text(&self) -> crate::TransportResult<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| crate::TransportError::SerializationFailed(e.to_string()))
    }

    /// Validate `payload` as JSON and wrap it with a fresh queue tag.
    ///
    /// Used by the HTTP transports for inbound bodies, where no line-level
    /// id is available; correlation happens on the JSON-RPC `id` above.
    pub(crate) fn json_tagged(payload: Bytes) -> crate::TransportResult<Self> {
        serde_json::from_slice::<serde_json::Value>(&payload)?;
        Ok(Self::new(
            MessageId::from(Uuid::new_v4().to_string()),
            payload,
        ))
    }
}
