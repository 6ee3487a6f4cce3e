//! Streamable HTTP transport: POST for outbound envelopes plus a long-lived
//! GET event stream for server pushes.
//!
//! The GET stream reconnects under a [`RetryPolicy`] and resumes with
//! `Last-Event-ID`. Servers that never serve the GET stream still work in a
//! POST-only mode; response bodies (JSON or inline SSE) are queued on the
//! same inbound channel `receive()` drains.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::{StatusCode, header};
use tokio::sync::{Mutex as TokioMutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use url::Url;
use uuid::Uuid;

use polymcp_protocol::{MessageId, PROTOCOL_VERSION};

use crate::error::{TransportError, TransportResult};
use crate::message::TransportMessage;
use crate::sse::SseParser;
use crate::traits::{Transport, TransportState, TransportType};

/// Reconnect policy for the event stream.
#[derive(Clone, Debug)]
pub enum RetryPolicy {
    /// Fixed interval between retries
    Fixed {
        /// Time between attempts
        interval: Duration,
        /// Maximum number of attempts, `None` for unlimited
        max_attempts: Option<u32>,
    },
    /// Exponential backoff
    Exponential {
        /// Base delay for the backoff calculation
        base: Duration,
        /// Cap on the delay between attempts
        max_delay: Duration,
        /// Maximum number of attempts, `None` for unlimited
        max_attempts: Option<u32>,
    },
    /// Never retry
    Never,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: Some(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based), or `None` when the
    /// policy is exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Fixed {
                interval,
                max_attempts,
            } => {
                if let Some(max) = max_attempts
                    && attempt >= *max
                {
                    return None;
                }
                Some(*interval)
            }
            Self::Exponential {
                base,
                max_delay,
                max_attempts,
            } => {
                if let Some(max) = max_attempts
                    && attempt >= *max
                {
                    return None;
                }
                let exponential =
                    (base.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
                let capped = exponential.min(max_delay.as_millis() as u64);
                // ±25% jitter to spread out reconnect storms
                let jitter_range = capped / 4;
                let jitter = if jitter_range > 0 {
                    fastrand::u64(0..jitter_range * 2)
                } else {
                    0
                };
                Some(Duration::from_millis(capped - jitter_range + jitter))
            }
            Self::Never => None,
        }
    }
}

/// Configuration for the streamable HTTP transport.
#[derive(Debug, Clone)]
pub struct StreamableConfig {
    /// Endpoint URL, shared by POST, GET, and DELETE
    pub url: String,
    /// Per-POST timeout; the GET stream itself is unbounded
    pub timeout: Duration,
    /// Reconnect policy for the event stream
    pub retry_policy: RetryPolicy,
    /// Bearer token attached as `Authorization` header
    pub auth_token: Option<String>,
    /// Additional headers attached to every request
    pub headers: HashMap<String, String>,
    /// `User-Agent` header, `None` to omit it
    pub user_agent: Option<String>,
    /// Value of the `MCP-Protocol-Version` header
    pub protocol_version: String,
}

impl StreamableConfig {
    /// Configuration for `url` with default limits.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for StreamableConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            auth_token: None,
            headers: HashMap::new(),
            user_agent: Some(format!("polymcp/{}", env!("CARGO_PKG_VERSION"))),
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// How one pass over the event stream ended.
enum StreamEnd {
    /// Shutdown was requested
    Shutdown,
    /// Stream was up, then closed or errored
    Ended,
    /// Server refuses to serve a push stream
    Rejected,
    /// Connection attempt failed outright
    Failed,
}

/// Transport over a streamable HTTP endpoint.
pub struct StreamableHttpTransport {
    config: StreamableConfig,
    client: reqwest::Client,
    state: Arc<Mutex<TransportState>>,
    session_id: Arc<Mutex<Option<String>>>,
    last_event_id: Arc<Mutex<Option<String>>>,
    inbound_tx: Arc<Mutex<Option<mpsc::Sender<TransportMessage>>>>,
    inbound: TokioMutex<Option<mpsc::Receiver<TransportMessage>>>,
    shutdown: Arc<Notify>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("url", &self.config.url)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl StreamableHttpTransport {
    /// Build a transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] when the HTTP client cannot
    /// be constructed.
    pub fn new(config: StreamableConfig) -> TransportResult<Self> {
        // A client-wide timeout would sever the long-lived event stream, so
        // POSTs get a per-request timeout instead.
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;

        Ok(Self {
            config,
            client,
            state: Arc::new(Mutex::new(TransportState::Disconnected)),
            session_id: Arc::new(Mutex::new(None)),
            last_event_id: Arc::new(Mutex::new(None)),
            inbound_tx: Arc::new(Mutex::new(None)),
            inbound: TokioMutex::new(None),
            shutdown: Arc::new(Notify::new()),
            stream_task: Mutex::new(None),
        })
    }

    fn set_state(&self, next: TransportState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!("Streamable HTTP transport state: {} -> {}", state, next);
            *state = next;
        }
    }

    fn build_headers(&self, accept: &'static str) -> header::HeaderMap {
        let mut headers = base_headers(&self.config, accept);
        if let Some(session_id) = self.session_id.lock().as_deref()
            && let Ok(value) = header::HeaderValue::from_str(session_id)
        {
            headers.insert("Mcp-Session-Id", value);
        }
        headers
    }

    fn store_session_id(&self, response: &reqwest::Response) {
        if let Some(session_id) = response
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock() = Some(session_id.to_string());
        }
    }
}

fn base_headers(config: &StreamableConfig, accept: &'static str) -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static(accept));

    if let Ok(value) = header::HeaderValue::from_str(&config.protocol_version) {
        headers.insert("MCP-Protocol-Version", value);
    }

    if let Some(token) = &config.auth_token
        && let Ok(value) = header::HeaderValue::from_str(&format!("Bearer {token}"))
    {
        headers.insert(header::AUTHORIZATION, value);
    }

    for (key, value) in &config.headers {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::from_bytes(key.as_bytes()),
            header::HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    headers
}

/// Event stream task: GET, parse, reconnect per policy.
#[allow(clippy::too_many_arguments)]
async fn event_stream_task(
    config: StreamableConfig,
    client: reqwest::Client,
    state: Arc<Mutex<TransportState>>,
    session_id: Arc<Mutex<Option<String>>>,
    last_event_id: Arc<Mutex<Option<String>>>,
    inbound_slot: Arc<Mutex<Option<mpsc::Sender<TransportMessage>>>>,
    tx: mpsc::Sender<TransportMessage>,
    shutdown: Arc<Notify>,
) {
    let mut attempt = 0u32;
    loop {
        match run_event_stream(&config, &client, &session_id, &last_event_id, &tx, &shutdown).await
        {
            StreamEnd::Shutdown => return,
            StreamEnd::Rejected => {
                debug!("server declined the event stream; continuing in POST-only mode");
                return;
            }
            StreamEnd::Ended => attempt = 0,
            StreamEnd::Failed => {}
        }

        let Some(delay) = config.retry_policy.delay(attempt) else {
            error!("event stream retries exhausted, giving up");
            {
                let mut state = state.lock();
                if matches!(*state, TransportState::Connected) {
                    *state = TransportState::Failed {
                        reason: "event stream retries exhausted".into(),
                    };
                }
            }
            // Closing the channel lets receive() observe the failure.
            inbound_slot.lock().take();
            return;
        };
        attempt += 1;
        warn!("reconnecting event stream in {:?} (attempt {})", delay, attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.notified() => return,
        }
    }
}

async fn run_event_stream(
    config: &StreamableConfig,
    client: &reqwest::Client,
    session_id: &Mutex<Option<String>>,
    last_event_id: &Mutex<Option<String>>,
    tx: &mpsc::Sender<TransportMessage>,
    shutdown: &Notify,
) -> StreamEnd {
    let mut headers = base_headers(config, "text/event-stream");
    if let Some(sid) = session_id.lock().as_deref()
        && let Ok(value) = header::HeaderValue::from_str(sid)
    {
        headers.insert("Mcp-Session-Id", value);
    }
    if let Some(last_id) = last_event_id.lock().as_deref()
        && let Ok(value) = header::HeaderValue::from_str(last_id)
    {
        headers.insert("Last-Event-ID", value);
    }

    let request = client.get(&config.url).headers(headers).send();
    let response = tokio::select! {
        result = request => result,
        _ = shutdown.notified() => return StreamEnd::Shutdown,
    };
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!("event stream connect failed: {e}");
            return StreamEnd::Failed;
        }
    };

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::NOT_FOUND
        || status == StatusCode::METHOD_NOT_ALLOWED
    {
        debug!("server declined the event stream: {status}");
        return StreamEnd::Rejected;
    }
    if !status.is_success() {
        warn!("event stream rejected: {status}");
        return StreamEnd::Failed;
    }

    if let Some(sid) = response
        .headers()
        .get("Mcp-Session-Id")
        .and_then(|v| v.to_str().ok())
    {
        *session_id.lock() = Some(sid.to_string());
    }

    debug!("event stream established");
    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            _ = shutdown.notified() => return StreamEnd::Shutdown,
        };
        match chunk {
            Some(Ok(chunk)) => {
                for event in parser.feed(&chunk) {
                    if let Some(id) = &event.id {
                        *last_event_id.lock() = Some(id.clone());
                    }
                    if !event.is_message() {
                        debug!("ignoring event type {:?}", event.event);
                        continue;
                    }
                    if event.data.trim().is_empty() {
                        continue;
                    }
                    trace!("event stream message: {} bytes", event.data.len());
                    let message = TransportMessage::new(
                        MessageId::from(Uuid::new_v4().to_string()),
                        Bytes::from(event.data),
                    );
                    if tx.send(message).await.is_err() {
                        return StreamEnd::Shutdown;
                    }
                }
            }
            Some(Err(e)) => {
                warn!("event stream read failed: {e}");
                return StreamEnd::Ended;
            }
            None => {
                debug!("event stream closed by server");
                return StreamEnd::Ended;
            }
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::StreamableHttp
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
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
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

        let (tx, rx) = mpsc::channel(1000);
        *self.inbound_tx.lock() = Some(tx.clone());
        *self.inbound.lock().await = Some(rx);

        let task = tokio::spawn(event_stream_task(
            self.config.clone(),
            self.client.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.session_id),
            Arc::clone(&self.last_event_id),
            Arc::clone(&self.inbound_tx),
            tx,
            Arc::clone(&self.shutdown),
        ));
        *self.stream_task.lock() = Some(task);

        self.set_state(TransportState::Connected);
        debug!(
            "Streamable HTTP transport connected to {}",
            self.config.url
        );
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if matches!(*self.state.lock(), TransportState::Disconnected) {
            return Ok(());
        }
        self.set_state(TransportState::Disconnecting);

        self.shutdown.notify_waiters();
        if let Some(task) = self.stream_task.lock().take() {
            task.abort();
        }

        // Best-effort session teardown.
        let session = self.session_id.lock().clone();
        if let Some(session) = session {
            let mut headers = header::HeaderMap::new();
            if let Ok(value) = header::HeaderValue::from_str(&session) {
                headers.insert("Mcp-Session-Id", value);
            }
            if let Ok(value) = header::HeaderValue::from_str(&self.config.protocol_version) {
                headers.insert("MCP-Protocol-Version", value);
            }
            let _ = self
                .client
                .delete(&self.config.url)
                .headers(headers)
                .timeout(self.config.timeout)
                .send()
                .await;
        }

        self.inbound_tx.lock().take();
        *self.inbound.lock().await = None;
        *self.session_id.lock() = None;
        *self.last_event_id.lock() = None;

        self.set_state(TransportState::Disconnected);
        debug!("Streamable HTTP transport disconnected");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        {
            let state = self.state.lock();
            if !matches!(*state, TransportState::Connected) {
                return Err(TransportError::NotConnected(state.to_string()));
            }
        }

        trace!("streamable HTTP POST: {} bytes", message.size());
        let response = self
            .client
            .post(&self.config.url)
            .headers(self.build_headers("application/json, text/event-stream"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(message.payload.to_vec())
            .timeout(self.config.timeout)
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
        if status == StatusCode::NOT_FOUND && self.session_id.lock().is_some() {
            self.set_state(TransportState::Failed {
                reason: "session expired".into(),
            });
            return Err(TransportError::ConnectionLost(
                "server no longer recognizes the session".into(),
            ));
        }
        if !status.is_success() {
            return Err(TransportError::SendFailed(format!("POST failed: {status}")));
        }

        self.store_session_id(&response);

        // 202 acknowledges a notification; no body follows.
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let Some(tx) = self.inbound_tx.lock().clone() else {
            return Err(TransportError::ConnectionLost("inbound queue closed".into()));
        };

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            // Responses to this request arrive as an inline event stream;
            // drain it here so they are queued before send() returns.
            let mut parser = SseParser::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        for event in parser.feed(&chunk) {
                            if let Some(id) = &event.id {
                                *self.last_event_id.lock() = Some(id.clone());
                            }
                            if !event.is_message() || event.data.trim().is_empty() {
                                continue;
                            }
                            let inbound = TransportMessage::new(
                                MessageId::from(Uuid::new_v4().to_string()),
                                Bytes::from(event.data),
                            );
                            if tx.send(inbound).await.is_err() {
                                return Err(TransportError::ConnectionLost(
                                    "inbound queue closed".into(),
                                ));
                            }
                        }
                    }
                    Err(e) => {
                        warn!("error reading POST event stream: {e}");
                        break;
                    }
                }
            }
            return Ok(());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        if body.is_empty() {
            return Ok(());
        }
        let inbound = TransportMessage::json_tagged(body)?;
        if tx.send(inbound).await.is_err() {
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
                trace!("streamable HTTP message in: {} bytes", message.size());
                Ok(Some(message))
            }
            None => {
                let mut state = self.state.lock();
                if matches!(*state, TransportState::Connected) {
                    *state = TransportState::Failed {
                        reason: "inbound channel closed".into(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn msg(id: i64) -> TransportMessage {
        let payload = format!(r#"{{"jsonrpc":"2.0","method":"ping","id":{id}}}"#);
        TransportMessage::new(MessageId::from(id), Bytes::from(payload))
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::Fixed {
            interval: Duration::from_millis(100),
            max_attempts: Some(3),
        }
    }

    async fn connected(server: &MockServer) -> StreamableHttpTransport {
        let mut config = StreamableConfig::new(format!("{}/mcp", server.uri()));
        config.retry_policy = quick_retry();
        let transport = StreamableHttpTransport::new(config).expect("client builds");
        transport.connect().await.unwrap();
        transport
    }

    #[test]
    fn fixed_policy_counts_attempts() {
        let policy = RetryPolicy::Fixed {
            interval: Duration::from_secs(5),
            max_attempts: Some(3),
        };
        assert_eq!(policy.delay(0), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(2), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(3), None);
    }

    #[test]
    fn exponential_policy_backs_off_with_jitter() {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        };

        let delay0 = policy.delay(0).unwrap();
        assert!(delay0 >= Duration::from_millis(750) && delay0 <= Duration::from_millis(1250));

        let delay2 = policy.delay(2).unwrap();
        assert!(delay2 >= Duration::from_millis(3000) && delay2 <= Duration::from_millis(5000));

        // Capped at max_delay (with jitter) far past the crossover point.
        let delay30 = policy.delay(30).unwrap();
        assert!(delay30 >= Duration::from_millis(45_000) && delay30 <= Duration::from_millis(75_000));
    }

    #[test]
    fn never_policy_gives_up_immediately() {
        assert_eq!(RetryPolicy::Never.delay(0), None);
    }

    #[tokio::test]
    async fn post_response_is_queued_without_event_stream() {
        let server = MockServer::start().await;
        // No GET mock mounted: the event stream request gets a 404 and the
        // transport continues in POST-only mode.
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"jsonrpc":"2.0","result":{},"id":1}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let transport = connected(&server).await;
        transport.send(msg(1)).await.unwrap();

        let received = transport.receive().await.unwrap().unwrap();
        assert_eq!(
            received.as_text().unwrap(),
            r#"{"jsonrpc":"2.0","result":{},"id":1}"#
        );

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn event_stream_pushes_reach_receive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "id: ev-1\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/tools/list_changed\"}\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let transport = connected(&server).await;
        let pushed = transport.receive().await.unwrap().unwrap();
        assert!(pushed.as_text().unwrap().contains("list_changed"));

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn reconnect_resumes_with_last_event_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mcp"))
            .and(header_matcher("Last-Event-ID", "ev-1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "id: ev-1\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n",
                "text/event-stream",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let transport = connected(&server).await;
        let _ = transport.receive().await.unwrap().unwrap();

        // First stream ends after one event; the reconnect carries the
        // resume header and is declined, which stops the task quietly.
        tokio::time::sleep(Duration::from_millis(500)).await;
        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn inline_sse_response_body_is_drained() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"jsonrpc\":\"2.0\",\"result\":{\"inline\":true},\"id\":1}\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let transport = connected(&server).await;
        transport.send(msg(1)).await.unwrap();

        let received = transport.receive().await.unwrap().unwrap();
        assert!(received.as_text().unwrap().contains("inline"));

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn notification_acknowledged_with_202() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let transport = connected(&server).await;
        transport.send(msg(1)).await.unwrap();

        let waited = timeout(Duration::from_millis(50), transport.receive()).await;
        assert!(waited.is_err(), "no message should be queued after a 202");

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_required() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let transport = connected(&server).await;
        let err = transport.send(msg(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::AuthRequired(_)));

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn expired_session_maps_to_connection_lost() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(header_matcher("Mcp-Session-Id", "sess-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Mcp-Session-Id", "sess-1")
                    .set_body_raw(r#"{"jsonrpc":"2.0","result":{},"id":1}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let transport = connected(&server).await;
        transport.send(msg(1)).await.unwrap();
        let _ = transport.receive().await.unwrap().unwrap();

        let err = transport.send(msg(2)).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost(_)));
        assert!(matches!(
            transport.state().await,
            TransportState::Failed { .. }
        ));
    }
}
