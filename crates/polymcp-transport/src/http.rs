//! Plain HTTP request/response transport.
//!
//! Every `send()` POSTs one JSON-RPC envelope and queues the response body
//! for `receive()`. The server has no push channel, so it can only speak
//! when spoken to; servers that want to stream should be reached through
//! the streamable HTTP transport instead.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{StatusCode, header};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tracing::{debug, trace};
use url::Url;

use polymcp_protocol::PROTOCOL_VERSION;

use crate::error::{TransportError, TransportResult};
use crate::message::TransportMessage;
use crate::traits::{Transport, TransportState, TransportType};

/// Configuration for the plain HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Endpoint URL the envelopes are POSTed to
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Bearer token attached as `Authorization` header
    pub auth_token: Option<String>,
    /// Additional headers attached to every request
    pub headers: HashMap<String, String>,
    /// `User-Agent` header, `None` to omit it
    pub user_agent: Option<String>,
    /// Value of the `MCP-Protocol-Version` header
    pub protocol_version: String,
}

impl HttpConfig {
    /// Configuration for `url` with default limits.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
            auth_token: None,
            headers: HashMap::new(),
            user_agent: Some(format!("polymcp/{}", env!("CARGO_PKG_VERSION"))),
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Transport that maps each outbound envelope to one HTTP POST.
pub struct HttpTransport {
    config: HttpConfig,
    client: reqwest::Client,
    state: Mutex<TransportState>,
    session_id: Mutex<Option<String>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<TransportMessage>>>,
    inbound: TokioMutex<Option<mpsc::UnboundedReceiver<TransportMessage>>>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.config.url)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build a transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] when the HTTP client cannot
    /// be constructed.
    pub fn new(config: HttpConfig) -> TransportResult<Self> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;

        Ok(Self {
            config,
            client,
            state: Mutex::new(TransportState::Disconnected),
            session_id: Mutex::new(None),
            inbound_tx: Mutex::new(None),
            inbound: TokioMutex::new(None),
        })
    }

    fn set_state(&self, next: TransportState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!("HTTP transport state: {} -> {}", state, next);
            *state = next;
        }
    }

    fn build_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        if let Ok(value) = header::HeaderValue::from_str(&self.config.protocol_version) {
            headers.insert("MCP-Protocol-Version", value);
        }

        if let Some(session_id) = self.session_id.lock().as_deref()
            && let Ok(value) = header::HeaderValue::from_str(session_id)
        {
            headers.insert("Mcp-Session-Id", value);
        }

        if let Some(token) = &self.config.auth_token
            && let Ok(value) = header::HeaderValue::from_str(&format!("Bearer {token}"))
        {
            headers.insert(header::AUTHORIZATION, value);
        }

        for (key, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::from_bytes(key.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    async fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    async fn connect(&self) -> TransportResult<()> {
        if self.is_connected().await {
            return Ok(());
        }
        self.set_state(TransportState::Connecting);

        let url = Url::parse(&self.config.url).map_err(|e| {
            let err = TransportError::Configuration(format!("invalid URL: {e}"));
            self.set_state(TransportState::Failed {
                reason: err.to_string(),
            });
            err
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            let err = TransportError::Configuration(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            ));
            self.set_state(TransportState::Failed {
                reason: err.to_string(),
            });
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound_tx.lock() = Some(tx);
        *self.inbound.lock().await = Some(rx);

        self.set_state(TransportState::Connected);
        debug!("HTTP transport connected to {}", self.config.url);
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if matches!(*self.state.lock(), TransportState::Disconnected) {
            return Ok(());
        }
        self.set_state(TransportState::Disconnecting);

        // Dropping the sender wakes any parked receive() with end-of-stream.
        self.inbound_tx.lock().take();
        *self.inbound.lock().await = None;
        *self.session_id.lock() = None;

        self.set_state(TransportState::Disconnected);
        debug!("HTTP transport disconnected");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        {
            let state = self.state.lock();
            if !matches!(*state, TransportState::Connected) {
                return Err(TransportError::NotConnected(state.to_string()));
            }
        }

        trace!("HTTP POST: {} bytes", message.size());
        let response = self
            .client
            .post(&self.config.url)
            .headers(self.build_headers())
            .header(header::CONTENT_TYPE, "application/json")
            .body(message.payload.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::SendFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::AuthRequired(format!(
                "server returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(TransportError::SendFailed(format!("POST failed: {status}")));
        }

        if let Some(session_id) = response
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock() = Some(session_id.to_string());
        }

        // 202 acknowledges a notification; no body follows.
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if content_type.contains("text/event-stream") {
            return Err(TransportError::Protocol(
                "server answered with an event stream; use the streamable HTTP transport".into(),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        if body.is_empty() {
            return Ok(());
        }

        let inbound = TransportMessage::json_tagged(body)?;
        let tx = self.inbound_tx.lock().clone();
        let delivered = tx.is_some_and(|tx| tx.send(inbound).is_ok());
        if !delivered {
            return Err(TransportError::ConnectionLost("inbound queue closed".into()));
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
                trace!("HTTP message in: {} bytes", message.size());
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.config.url.clone())
    }
}
