//! Per-session inbound message routing.
//!
//! One task owns `transport.receive()` and classifies everything inbound:
//! responses resolve a correlation waiter, server requests and notifications
//! go to handlers installed by the session. Construction is two-phase
//! (`new()`, then `start()` once handlers are set) so nothing can arrive
//! before the session is wired up.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use polymcp_protocol::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use polymcp_transport::{Transport, TransportMessage};

pub(crate) type ServerRequestHandler = Arc<dyn Fn(JsonRpcRequest) + Send + Sync>;
pub(crate) type ServerNotificationHandler = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;
pub(crate) type ConnectionClosedHandler = Arc<dyn Fn() + Send + Sync>;

/// Routing hub for one session's transport.
pub(crate) struct MessageDispatcher {
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
    on_request: Mutex<Option<ServerRequestHandler>>,
    on_notification: Mutex<Option<ServerNotificationHandler>>,
    on_closed: Mutex<Option<ConnectionClosedHandler>>,
    shutdown: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MessageDispatcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            waiters: Mutex::new(HashMap::new()),
            on_request: Mutex::new(None),
            on_notification: Mutex::new(None),
            on_closed: Mutex::new(None),
            shutdown: Notify::new(),
            task: Mutex::new(None),
        })
    }

    pub(crate) fn set_request_handler(&self, handler: ServerRequestHandler) {
        *self.on_request.lock() = Some(handler);
    }

    pub(crate) fn set_notification_handler(&self, handler: ServerNotificationHandler) {
        *self.on_notification.lock() = Some(handler);
    }

    pub(crate) fn set_closed_handler(&self, handler: ConnectionClosedHandler) {
        *self.on_closed.lock() = Some(handler);
    }

    /// Register interest in the response for `id`.
    ///
    /// Must be called before the request is written to the transport, or a
    /// fast responder could win the race and the response would be dropped
    /// as unmatched.
    pub(crate) fn wait_for_response(&self, id: RequestId) -> oneshot::Receiver<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id, tx);
        rx
    }

    /// Abandon a waiter after a local timeout or a failed send.
    pub(crate) fn forget(&self, id: &RequestId) {
        self.waiters.lock().remove(id);
    }

    /// Stop the routing task. Pending waiters are dropped, so in-flight
    /// callers fail with a closed channel instead of hanging.
    pub(crate) fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Spawn the routing task as the sole consumer of `transport.receive()`.
    pub(crate) fn start(self: &Arc<Self>, transport: Arc<dyn Transport>) {
        let dispatcher = Arc::clone(self);
        let handle = tokio::spawn(async move { dispatcher.run(transport).await });
        *self.task.lock() = Some(handle);
    }

    async fn run(&self, transport: Arc<dyn Transport>) {
        loop {
            tokio::select! {
                // Biased so an explicit shutdown is seen before the channel
                // close it causes; teardown must not be misread as failure.
                biased;
                () = self.shutdown.notified() => {
                    debug!("dispatcher shutting down");
                    break;
                }
                received = transport.receive() => match received {
                    Ok(Some(message)) => self.route(&message),
                    Ok(None) => {
                        debug!("inbound channel closed");
                        self.connection_closed();
                        break;
                    }
                    Err(e) => {
                        warn!("receive error: {e}");
                        if !transport.is_connected().await {
                            self.connection_closed();
                            break;
                        }
                    }
                }
            }
        }
        self.drain();
    }

    fn route(&self, message: &TransportMessage) {
        match serde_json::from_slice::<JsonRpcMessage>(&message.payload) {
            Ok(JsonRpcMessage::Response(response)) => self.resolve(response),
            Ok(JsonRpcMessage::Request(request)) => {
                let handler = self.on_request.lock().clone();
                match handler {
                    Some(handler) => handler(request),
                    None => warn!(
                        method = %request.method,
                        "server request arrived with no handler installed"
                    ),
                }
            }
            Ok(JsonRpcMessage::Notification(notification)) => {
                let handler = self.on_notification.lock().clone();
                if let Some(handler) = handler {
                    handler(notification);
                }
            }
            Err(e) => warn!("discarding unparseable inbound message: {e}"),
        }
    }

    fn resolve(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_request_id().cloned() else {
            warn!("discarding response with null id");
            return;
        };
        let waiter = self.waiters.lock().remove(&id);
        match waiter {
            // The caller may have timed out and dropped its receiver.
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => warn!(%id, "discarding response for unknown request id"),
        }
    }

    fn connection_closed(&self) {
        let handler = self.on_closed.lock().clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn drain(&self) {
        let count = {
            let mut waiters = self.waiters.lock();
            let count = waiters.len();
            waiters.clear();
            count
        };
        if count > 0 {
            debug!(count, "dropped in-flight waiters on dispatcher exit");
        }
    }
}
