//! Per-server sessions.
//!
//! A [`Session`] wraps exactly one transport for its lifetime and drives the
//! MCP handshake, request/response correlation, capability caches, and
//! notification fan-out. Its lifecycle is a checked state machine; `failed`
//! and `closed` are terminal, and reconnecting always builds a new session
//! rather than resurrecting the old one.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use polymcp_protocol::types::{
    ClientCapabilities, Implementation, InitializeRequest, InitializeResult, ListRootsResult,
    Prompt, Resource, Root, ServerCapabilities, Tool,
};
use polymcp_protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MessageId,
    PROTOCOL_VERSION, RequestId, SUPPORTED_PROTOCOL_VERSIONS,
};
use polymcp_transport::{Transport, TransportMessage};

use crate::config::{self, ServerConfig};
use crate::error::{ClientError, ClientResult};

mod cache;
mod dispatcher;
mod notify;
mod operations;

pub use notify::{NotificationSubscription, SessionNotification};

use cache::CapabilityCache;
use dispatcher::MessageDispatcher;
use notify::NotificationRegistry;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, nothing attempted yet
    Idle,
    /// Transport connection in progress
    Connecting,
    /// Transport up, handshake not finished
    Initializing,
    /// Handshake complete, operations available
    Ready,
    /// The endpoint demanded authorization
    PendingAuth,
    /// Interactive authorization in progress
    Authenticating,
    /// Unrecoverable failure
    Failed,
    /// Deliberately closed
    Closed,
}

impl SessionState {
    /// `true` for states no further work can leave, other than closing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    /// Whether `self -> to` is a defined lifecycle edge.
    ///
    /// There is deliberately no `idle -> ready` shortcut and no way back
    /// from `ready` to `pending_auth`; an authorization demand can only
    /// interrupt the handshake.
    pub fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Idle, Self::Connecting)
            | (Self::Connecting, Self::Initializing)
            | (Self::Initializing, Self::Ready)
            | (Self::Initializing, Self::PendingAuth)
            | (Self::PendingAuth, Self::Authenticating)
            | (Self::Authenticating, Self::Ready)
            | (Self::Ready, Self::Closed)
            | (Self::PendingAuth, Self::Closed)
            | (Self::Failed, Self::Closed) => true,
            // Any non-terminal state may fail.
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::PendingAuth => "pending_auth",
            Self::Authenticating => "authenticating",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Refetch capability lists in the background when the server announces
    /// a change; when off, a stale cache refetches on the next read instead
    pub auto_refresh: bool,
    /// Deadline applied to every request; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            request_timeout: None,
        }
    }
}

/// Which capability cache a `list_changed` notification invalidated.
#[derive(Clone, Copy)]
enum CapabilityKind {
    Tools,
    Resources,
    Prompts,
}

/// Cheap-clone handle to one server session. All clones share state; the
/// routing task stops when the last handle drops.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    name: String,
    config: ServerConfig,
    options: SessionOptions,
    state: Mutex<SessionState>,
    /// Swapped only by the auth overlay, before `ready`.
    transport: Mutex<Arc<dyn Transport>>,
    dispatcher: Mutex<Option<Arc<MessageDispatcher>>>,
    next_id: AtomicU64,
    server_info: Mutex<Option<Implementation>>,
    server_capabilities: Mutex<Option<ServerCapabilities>>,
    tools: CapabilityCache<Tool>,
    resources: CapabilityCache<Resource>,
    prompts: CapabilityCache<Prompt>,
    roots: Mutex<Vec<Root>>,
    notifications: Arc<NotificationRegistry>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // Stops the routing task when the last handle goes away without a
        // disconnect; a stdio child is reaped by kill_on_drop.
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.shutdown();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.inner.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session for `name`, with the transport built from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the transport cannot be built
    /// from the configuration.
    pub fn new(name: impl Into<String>, config: ServerConfig) -> ClientResult<Self> {
        Self::with_options(name, config, SessionOptions::default())
    }

    /// Session with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the transport cannot be built
    /// from the configuration.
    pub fn with_options(
        name: impl Into<String>,
        config: ServerConfig,
        options: SessionOptions,
    ) -> ClientResult<Self> {
        let transport = config::build_transport(&config)?;
        Ok(Self::with_transport(name, config, options, transport))
    }

    /// Session over a caller-provided transport; `config.transport` is kept
    /// for reference but not used to build anything.
    pub fn with_transport(
        name: impl Into<String>,
        config: ServerConfig,
        options: SessionOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                name: name.into(),
                roots: Mutex::new(config.roots.clone()),
                config,
                options,
                state: Mutex::new(SessionState::Idle),
                transport: Mutex::new(transport),
                dispatcher: Mutex::new(None),
                next_id: AtomicU64::new(1),
                server_info: Mutex::new(None),
                server_capabilities: Mutex::new(None),
                tools: CapabilityCache::new(),
                resources: CapabilityCache::new(),
                prompts: CapabilityCache::new(),
                notifications: Arc::new(NotificationRegistry::new()),
            }),
        }
    }

    /// Server name this session belongs to.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration the session was built from.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub(crate) fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Server identity, populated once the handshake completes.
    pub fn server_info(&self) -> Option<Implementation> {
        self.inner.server_info.lock().clone()
    }

    /// Server capability declaration, populated once the handshake
    /// completes.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.inner.server_capabilities.lock().clone()
    }

    /// Roots currently advertised to the server.
    pub fn roots(&self) -> Vec<Root> {
        self.inner.roots.lock().clone()
    }

    /// Subscribe to every notification this server sends.
    ///
    /// Handlers run on the session's routing task in transport arrival
    /// order, so they should hand heavy work off to their own tasks.
    /// Dropping the returned subscription deregisters the handler.
    pub fn on_notification(
        &self,
        handler: impl Fn(&SessionNotification) + Send + Sync + 'static,
    ) -> NotificationSubscription {
        let id = self.inner.notifications.add(Arc::new(handler));
        NotificationSubscription::new(&self.inner.notifications, id)
    }

    /// Connect the transport and prepare for the handshake.
    ///
    /// On success the session is `initializing` and the routing task is
    /// running. An authorization demand leaves the session in `pending_auth`
    /// and returns [`ClientError::AuthRequired`]; any other failure is
    /// terminal.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidTransition`] unless the session is
    /// `idle`, plus any transport connection error.
    pub async fn connect(&self) -> ClientResult<()> {
        self.transition(SessionState::Idle, SessionState::Connecting)?;
        let transport = self.transport();
        debug!(
            server = %self.inner.name,
            endpoint = transport.endpoint().as_deref().unwrap_or("-"),
            "connecting"
        );
        match transport.connect().await.map_err(ClientError::from) {
            Ok(()) => {
                self.transition(SessionState::Connecting, SessionState::Initializing)?;
                self.attach_dispatcher(&transport);
                Ok(())
            }
            Err(ClientError::AuthRequired(msg)) => {
                // The endpoint demanded credentials before any handshake
                // could start.
                self.transition(SessionState::Connecting, SessionState::Initializing)?;
                self.transition(SessionState::Initializing, SessionState::PendingAuth)?;
                Err(ClientError::AuthRequired(msg))
            }
            Err(e) => {
                self.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Run the initialize exchange and bring the session to `ready`.
    ///
    /// Validates the negotiated protocol version, stores the server's
    /// identity and capabilities, acknowledges with
    /// `notifications/initialized`, and advertises configured roots.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidTransition`] unless the session is
    /// `initializing`; [`ClientError::AuthRequired`] when the server demands
    /// authorization (session moves to `pending_auth`); any other handshake
    /// failure is terminal.
    pub async fn initialize(&self) -> ClientResult<()> {
        let state = self.state();
        if state != SessionState::Initializing {
            return Err(ClientError::InvalidTransition {
                from: state,
                to: SessionState::Ready,
            });
        }

        match self.perform_handshake().await {
            Ok(()) => {
                self.transition(SessionState::Initializing, SessionState::Ready)?;
                info!(server = %self.inner.name, "session ready");
                Ok(())
            }
            Err(ClientError::AuthRequired(msg)) => {
                self.transition(SessionState::Initializing, SessionState::PendingAuth)?;
                Err(ClientError::AuthRequired(msg))
            }
            Err(e) => {
                self.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Close the session, its routing task, and its transport.
    ///
    /// Idempotent once closed. The session is `closed` afterwards even when
    /// transport teardown reports an error.
    ///
    /// # Errors
    ///
    /// Returns the transport's teardown error, if any.
    pub async fn disconnect(&self) -> ClientResult<()> {
        {
            let mut state = self.inner.state.lock();
            if *state == SessionState::Closed {
                return Ok(());
            }
            // States without a direct edge to closed abandon the attempt
            // through failed first, staying on defined edges.
            if !state.can_transition_to(SessionState::Closed) {
                debug!(server = %self.inner.name, "session state: {} -> failed", *state);
                *state = SessionState::Failed;
            }
            debug!(server = %self.inner.name, "session state: {} -> closed", *state);
            *state = SessionState::Closed;
        }

        if let Some(dispatcher) = self.inner.dispatcher.lock().take() {
            dispatcher.shutdown();
        }
        self.transport().disconnect().await.map_err(ClientError::from)
    }

    /// `pending_auth -> authenticating`, entered by the auth overlay.
    pub(crate) fn begin_authentication(&self) -> ClientResult<()> {
        self.transition(SessionState::PendingAuth, SessionState::Authenticating)
    }

    /// Swap in a transport carrying fresh credentials and redo the connect
    /// and handshake. Legal only while `authenticating`. Errors are returned
    /// without failing the session so the overlay can retry another mode.
    pub(crate) async fn resume_with_transport(
        &self,
        transport: Arc<dyn Transport>,
    ) -> ClientResult<()> {
        let state = self.state();
        if state != SessionState::Authenticating {
            return Err(ClientError::InvalidTransition {
                from: state,
                to: SessionState::Ready,
            });
        }

        // Retire the previous connector; a rejected transport is discarded,
        // never reconnected in place.
        if let Some(old) = self.inner.dispatcher.lock().take() {
            old.shutdown();
        }
        let old_transport = {
            let mut slot = self.inner.transport.lock();
            std::mem::replace(&mut *slot, Arc::clone(&transport))
        };
        if let Err(e) = old_transport.disconnect().await {
            debug!(server = %self.inner.name, "previous transport teardown: {e}");
        }

        transport.connect().await.map_err(ClientError::from)?;
        self.attach_dispatcher(&transport);
        self.perform_handshake().await?;
        self.transition(SessionState::Authenticating, SessionState::Ready)?;
        info!(server = %self.inner.name, "session ready after authorization");
        Ok(())
    }

    fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport.lock())
    }

    fn transition(&self, from: SessionState, to: SessionState) -> ClientResult<()> {
        let mut state = self.inner.state.lock();
        if *state != from || !from.can_transition_to(to) {
            return Err(ClientError::InvalidTransition { from: *state, to });
        }
        debug!(server = %self.inner.name, "session state: {from} -> {to}");
        *state = to;
        Ok(())
    }

    /// Move to `failed` unless already terminal.
    pub(crate) fn mark_failed(&self, reason: &str) {
        let mut state = self.inner.state.lock();
        if state.is_terminal() {
            return;
        }
        warn!(server = %self.inner.name, "session failed (was {}): {reason}", *state);
        *state = SessionState::Failed;
    }

    fn ensure_ready(&self) -> ClientResult<()> {
        let state = self.state();
        if state == SessionState::Ready {
            Ok(())
        } else {
            Err(ClientError::NotReady {
                server: self.inner.name.clone(),
                state,
            })
        }
    }

    /// Wire up a fresh dispatcher for `transport` and start its routing
    /// task. Handlers hold only weak session references so the dispatcher
    /// does not keep the session (and itself) alive in a cycle.
    fn attach_dispatcher(&self, transport: &Arc<dyn Transport>) {
        let dispatcher = MessageDispatcher::new();

        let weak = Arc::downgrade(&self.inner);
        dispatcher.set_request_handler(Arc::new(move |request| {
            if let Some(inner) = weak.upgrade() {
                let session = Session { inner };
                tokio::spawn(async move {
                    session.answer_server_request(request).await;
                });
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        dispatcher.set_notification_handler(Arc::new(move |notification| {
            if let Some(inner) = weak.upgrade() {
                Session { inner }.handle_notification(notification);
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        dispatcher.set_closed_handler(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Session { inner }.handle_connection_closed();
            }
        }));

        dispatcher.start(Arc::clone(transport));
        *self.inner.dispatcher.lock() = Some(dispatcher);
    }

    async fn perform_handshake(&self) -> ClientResult<()> {
        let params = InitializeRequest {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::with_roots(),
            client_info: Implementation::new("polymcp", env!("CARGO_PKG_VERSION")),
        };
        let value = self
            .request("initialize", Some(serde_json::to_value(&params)?), None)
            .await?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| ClientError::Handshake(format!("malformed initialize result: {e}")))?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(ClientError::Handshake(format!(
                "server selected unsupported protocol version '{}'",
                result.protocol_version
            )));
        }

        debug!(
            server = %self.inner.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "handshake complete"
        );
        *self.inner.server_info.lock() = Some(result.server_info);
        *self.inner.server_capabilities.lock() = Some(result.capabilities);

        self.notify("notifications/initialized", None).await?;

        let announce_roots = !self.inner.roots.lock().is_empty();
        if announce_roots {
            self.notify("notifications/roots/list_changed", None).await?;
        }
        Ok(())
    }

    /// Issue one request and wait for its correlated response.
    ///
    /// No state requirement: the handshake and the auth overlay call this
    /// before `ready`. Public operations gate on `ensure_ready` first.
    pub(crate) async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> ClientResult<Value> {
        let dispatcher = self.inner.dispatcher.lock().clone().ok_or_else(|| {
            ClientError::Closed(format!("no connection to '{}'", self.inner.name))
        })?;

        let id = RequestId::from(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let payload = Bytes::from(serde_json::to_vec(&request)?);

        // Waiter first, then send: the response can arrive before send()
        // even returns.
        let waiter = dispatcher.wait_for_response(id.clone());
        if let Err(e) = self.send_message(id.clone(), payload).await {
            dispatcher.forget(&id);
            return Err(e);
        }

        let received = match timeout.or(self.inner.options.request_timeout) {
            Some(deadline) => match tokio::time::timeout(deadline, waiter).await {
                Ok(received) => received,
                Err(_) => {
                    // Abandon the waiter locally; if the answer ever shows
                    // up the routing task drops it as unmatched.
                    dispatcher.forget(&id);
                    return Err(ClientError::Timeout {
                        method: method.to_string(),
                        timeout: deadline,
                    });
                }
            },
            None => waiter.await,
        };

        let response = received.map_err(|_| {
            ClientError::Closed(format!(
                "connection to '{}' closed while awaiting '{method}'",
                self.inner.name
            ))
        })?;

        response.into_result().map_err(|e| ClientError::Protocol {
            code: e.code,
            message: e.message,
        })
    }

    /// Request returning a typed result.
    pub(crate) async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> ClientResult<R> {
        let value = self.request(method, params, timeout).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send one fire-and-forget notification.
    pub(crate) async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        let payload = Bytes::from(serde_json::to_vec(&notification)?);
        self.send_message(MessageId::from(Uuid::new_v4().to_string()), payload)
            .await
    }

    /// Write one payload to the transport. Send failures are fatal to the
    /// session except while the auth overlay owns the failure policy.
    async fn send_message(&self, id: MessageId, payload: Bytes) -> ClientResult<()> {
        if let Err(e) = self
            .transport()
            .send(TransportMessage::new(id, payload))
            .await
        {
            let err = ClientError::from(e);
            if !matches!(err, ClientError::AuthRequired(_))
                && self.state() != SessionState::Authenticating
            {
                self.mark_failed(&err.to_string());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Answer a server-to-client request. Runs on its own task so a slow
    /// answer never stalls the routing loop.
    async fn answer_server_request(&self, request: JsonRpcRequest) {
        let method = request.method.clone();
        let response = match method.as_str() {
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "roots/list" => {
                let result = ListRootsResult { roots: self.roots() };
                match serde_json::to_value(&result) {
                    Ok(value) => JsonRpcResponse::success(request.id, value),
                    Err(e) => JsonRpcResponse::error(
                        Some(request.id),
                        JsonRpcError::internal_error(&e.to_string()),
                    ),
                }
            }
            other => {
                debug!(server = %self.inner.name, method = other, "unsupported server request");
                JsonRpcResponse::error(Some(request.id), JsonRpcError::method_not_found(other))
            }
        };

        let id = response
            .id
            .as_request_id()
            .cloned()
            .unwrap_or_else(|| MessageId::from(Uuid::new_v4().to_string()));
        let outcome = async {
            let payload = Bytes::from(serde_json::to_vec(&response)?);
            self.send_message(id, payload).await
        };
        if let Err(e) = outcome.await {
            warn!(server = %self.inner.name, method = %method, "failed to answer server request: {e}");
        }
    }

    /// Classify an inbound notification, invalidate caches, and fan out.
    /// Runs inline on the routing task to preserve arrival order.
    fn handle_notification(&self, notification: JsonRpcNotification) {
        let parsed = SessionNotification::from_wire(&notification.method, notification.params);
        match &parsed {
            SessionNotification::ToolsListChanged => {
                self.inner.tools.invalidate();
                self.spawn_refresh(CapabilityKind::Tools);
            }
            SessionNotification::ResourcesListChanged => {
                self.inner.resources.invalidate();
                self.spawn_refresh(CapabilityKind::Resources);
            }
            SessionNotification::PromptsListChanged => {
                self.inner.prompts.invalidate();
                self.spawn_refresh(CapabilityKind::Prompts);
            }
            _ => {}
        }
        self.inner.notifications.publish(&parsed);
    }

    /// Background refetch after an invalidation. Failure only logs; the
    /// stale flag stays set so the next read retries.
    fn spawn_refresh(&self, kind: CapabilityKind) {
        if !self.inner.options.auto_refresh || self.state() != SessionState::Ready {
            return;
        }
        let session = self.clone();
        tokio::spawn(async move {
            let refreshed = match kind {
                CapabilityKind::Tools => session.refresh_tools().await.map(|_| ()),
                CapabilityKind::Resources => session.refresh_resources().await.map(|_| ()),
                CapabilityKind::Prompts => session.refresh_prompts().await.map(|_| ()),
            };
            if let Err(e) = refreshed {
                debug!(server = %session.inner.name, "background refresh failed: {e}");
            }
        });
    }

    fn handle_connection_closed(&self) {
        let mut state = self.inner.state.lock();
        match *state {
            SessionState::Closed | SessionState::Failed => {}
            from => {
                warn!(server = %self.inner.name, "connection closed unexpectedly (was {from})");
                *state = SessionState::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use SessionState::*;

    #[test]
    fn defined_edges_are_allowed() {
        let edges = [
            (Idle, Connecting),
            (Connecting, Initializing),
            (Initializing, Ready),
            (Initializing, PendingAuth),
            (PendingAuth, Authenticating),
            (Authenticating, Ready),
            (Authenticating, Failed),
            (Ready, Closed),
            (PendingAuth, Closed),
            (Failed, Closed),
            (Idle, Failed),
            (Connecting, Failed),
            (Initializing, Failed),
            (Ready, Failed),
        ];
        for (from, to) in edges {
            assert!(from.can_transition_to(to), "{from} -> {to} should be legal");
        }
    }

    #[test]
    fn undefined_edges_are_rejected() {
        let edges = [
            (Idle, Ready),
            (Idle, Initializing),
            (Ready, PendingAuth),
            (Ready, Initializing),
            (Connecting, Ready),
            (PendingAuth, Ready),
            (Initializing, Authenticating),
            (Closed, Connecting),
            (Closed, Failed),
            (Failed, Ready),
            (Failed, Failed),
            (Idle, Closed),
            (Connecting, Closed),
            (Initializing, Closed),
            (Authenticating, Closed),
        ];
        for (from, to) in edges {
            assert!(
                !from.can_transition_to(to),
                "{from} -> {to} should be illegal"
            );
        }
    }

    #[test]
    fn terminal_states() {
        assert!(Failed.is_terminal());
        assert!(Closed.is_terminal());
        assert!(!Ready.is_terminal());
        assert!(!PendingAuth.is_terminal());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(PendingAuth).unwrap(),
            serde_json::json!("pending_auth")
        );
        assert_eq!(PendingAuth.to_string(), "pending_auth");
        assert_eq!(Authenticating.to_string(), "authenticating");
    }

    #[test]
    fn options_default_to_auto_refresh_without_timeout() {
        let options = SessionOptions::default();
        assert!(options.auto_refresh);
        assert_eq!(options.request_timeout, None);
    }
}
