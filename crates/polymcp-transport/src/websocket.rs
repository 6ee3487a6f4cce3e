//! WebSocket transport: JSON-RPC messages as text frames over a single
//! upgraded connection.
//!
//! A reader task owns the receive half, forwards text and binary frames to
//! the inbound queue, and answers pings. A close frame or stream end closes
//! the queue, which `receive()` reports as end-of-stream.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;
use uuid::Uuid;

use polymcp_protocol::MessageId;

use crate::error::{TransportError, TransportResult};
use crate::message::TransportMessage;
use crate::traits::{Transport, TransportState, TransportType};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Endpoint URL (`ws://` or `wss://`)
    pub url: String,
    /// Bearer token attached to the upgrade request
    pub auth_token: Option<String>,
    /// Additional headers attached to the upgrade request
    pub headers: HashMap<String, String>,
    /// Inbound queue depth
    pub channel_capacity: usize,
}

impl WebSocketConfig {
    /// Configuration for `url` with default limits.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_token: None,
            headers: HashMap::new(),
            channel_capacity: 1000,
        }
    }
}

/// Transport over a WebSocket connection.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    state: Mutex<TransportState>,
    writer: Arc<TokioMutex<Option<WsWriter>>>,
    inbound: TokioMutex<Option<mpsc::Receiver<TransportMessage>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.config.url)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Build a transport for `config`. No connection is made until
    /// [`Transport::connect`].
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            state: Mutex::new(TransportState::Disconnected),
            writer: Arc::new(TokioMutex::new(None)),
            inbound: TokioMutex::new(None),
            reader_task: Mutex::new(None),
        }
    }

    fn set_state(&self, next: TransportState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!("WebSocket transport state: {} -> {}", state, next);
            *state = next;
        }
    }

    fn build_request(&self) -> TransportResult<http::Request<()>> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Configuration(format!("invalid URL: {e}")))?;

        let headers = request.headers_mut();
        if let Some(token) = &self.config.auth_token
            && let Ok(value) = http::HeaderValue::from_str(&format!("Bearer {token}"))
        {
            headers.insert(http::header::AUTHORIZATION, value);
        }
        for (key, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                http::HeaderName::from_bytes(key.as_bytes()),
                http::HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        Ok(request)
    }
}

/// Reader task: forward frames to the queue, answer pings.
async fn read_frames(
    mut reader: WsReader,
    writer: Arc<TokioMutex<Option<WsWriter>>>,
    tx: mpsc::Sender<TransportMessage>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let message = TransportMessage::new(
                    MessageId::from(Uuid::new_v4().to_string()),
                    Bytes::from(text.as_bytes().to_vec()),
                );
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                let message =
                    TransportMessage::new(MessageId::from(Uuid::new_v4().to_string()), data);
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                if let Some(writer) = writer.lock().await.as_mut() {
                    let _ = writer.send(Message::Pong(data)).await;
                }
            }
            Ok(Message::Pong(_)) => {
                trace!("WebSocket pong received");
            }
            Ok(Message::Close(_)) => {
                debug!("WebSocket closed by server");
                break;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                warn!("WebSocket read failed: {e}");
                break;
            }
        }
    }
    // Dropping tx closes the queue, which receive() reports as end-of-stream.
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }

    async fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    async fn connect(&self) -> TransportResult<()> {
        if self.is_connected().await {
            return Ok(());
        }
        self.set_state(TransportState::Connecting);

        match Url::parse(&self.config.url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => {
                let err = TransportError::Configuration(format!(
                    "unsupported URL scheme: {}",
                    url.scheme()
                ));
                self.set_state(TransportState::Failed {
                    reason: err.to_string(),
                });
                return Err(err);
            }
            Err(e) => {
                let err = TransportError::Configuration(format!("invalid URL: {e}"));
                self.set_state(TransportState::Failed {
                    reason: err.to_string(),
                });
                return Err(err);
            }
        }

        let request = self.build_request()?;
        let (stream, _response) = match connect_async(request).await {
            Ok(pair) => pair,
            Err(tungstenite::Error::Http(response)) => {
                let status = response.status();
                let err = if status == http::StatusCode::UNAUTHORIZED
                    || status == http::StatusCode::FORBIDDEN
                {
                    TransportError::AuthRequired(format!("server returned {status}"))
                } else {
                    TransportError::ConnectionFailed(format!("upgrade rejected: {status}"))
                };
                self.set_state(TransportState::Failed {
                    reason: err.to_string(),
                });
                return Err(err);
            }
            Err(e) => {
                let err = TransportError::ConnectionFailed(e.to_string());
                self.set_state(TransportState::Failed {
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        let (writer, reader) = stream.split();
        *self.writer.lock().await = Some(writer);

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        *self.inbound.lock().await = Some(rx);

        let task = tokio::spawn(read_frames(reader, Arc::clone(&self.writer), tx));
        *self.reader_task.lock() = Some(task);

        self.set_state(TransportState::Connected);
        debug!("WebSocket transport connected to {}", self.config.url);
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if matches!(*self.state.lock(), TransportState::Disconnected) {
            return Ok(());
        }
        self.set_state(TransportState::Disconnecting);

        // Best-effort close frame before tearing the connection down.
        if let Some(writer) = self.writer.lock().await.as_mut() {
            let _ = writer.send(Message::Close(None)).await;
        }

        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }

        *self.writer.lock().await = None;
        *self.inbound.lock().await = None;

        self.set_state(TransportState::Disconnected);
        debug!("WebSocket transport disconnected");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        {
            let state = self.state.lock();
            if !matches!(*state, TransportState::Connected) {
                return Err(TransportError::NotConnected(state.to_string()));
            }
        }

        let text = String::from_utf8(message.payload.to_vec())
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;

        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(TransportError::NotConnected("writer closed".into()));
        };

        trace!("WebSocket frame out: {} bytes", text.len());
        if let Err(e) = writer.send(Message::Text(text.into())).await {
            let err = TransportError::SendFailed(e.to_string());
            self.set_state(TransportState::Failed {
                reason: err.to_string(),
            });
            return Err(err);
        }
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut inbound = self.inbound.lock().await;
        let Some(rx) = inbound.as_mut() else {
            let state = self.state.lock().to_string();
            return Err(TransportError::NotConnected(state));
        };
        match rx.recv().await {
            Some(message) => {
                trace!("WebSocket frame in: {} bytes", message.size());
                Ok(Some(message))
            }
            None => {
                let mut state = self.state.lock();
                if matches!(*state, TransportState::Connected) {
                    *state = TransportState::Failed {
                        reason: "connection closed".into(),
                    };
                }
                Ok(None)
            }
        }
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.config.url.clone())
    }
}
