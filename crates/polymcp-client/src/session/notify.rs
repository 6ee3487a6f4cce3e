//! Server notification fan-out.
//!
//! Inbound notifications are parsed into [`SessionNotification`] and pushed
//! to every subscriber, on the routing task, in transport arrival order.
//! Methods this client does not model are preserved as
//! [`SessionNotification::Other`] rather than dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use polymcp_protocol::types::{
    CancelledParams, LoggingMessageParams, ProgressParams, ResourceUpdatedParams,
};

/// One notification received from a server.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    /// The server's tool list changed
    ToolsListChanged,
    /// The server's resource list changed
    ResourcesListChanged,
    /// The server's prompt list changed
    PromptsListChanged,
    /// A subscribed resource changed
    ResourceUpdated(ResourceUpdatedParams),
    /// Progress report for a long-running request
    Progress(ProgressParams),
    /// The server cancelled a request
    Cancelled(CancelledParams),
    /// A server log entry
    LoggingMessage(LoggingMessageParams),
    /// Any method this client does not model
    Other {
        /// Notification method name
        method: String,
        /// Raw parameters as received
        params: Option<Value>,
    },
}

impl SessionNotification {
    /// The wire method name.
    pub fn method(&self) -> &str {
        match self {
            Self::ToolsListChanged => "notifications/tools/list_changed",
            Self::ResourcesListChanged => "notifications/resources/list_changed",
            Self::PromptsListChanged => "notifications/prompts/list_changed",
            Self::ResourceUpdated(_) => "notifications/resources/updated",
            Self::Progress(_) => "notifications/progress",
            Self::Cancelled(_) => "notifications/cancelled",
            Self::LoggingMessage(_) => "notifications/message",
            Self::Other { method, .. } => method,
        }
    }

    /// Classify a wire notification. Known methods with malformed or missing
    /// params degrade to [`Self::Other`] so subscribers still see them.
    pub(crate) fn from_wire(method: &str, params: Option<Value>) -> Self {
        match method {
            "notifications/tools/list_changed" => Self::ToolsListChanged,
            "notifications/resources/list_changed" => Self::ResourcesListChanged,
            "notifications/prompts/list_changed" => Self::PromptsListChanged,
            "notifications/resources/updated" => parse(method, params, Self::ResourceUpdated),
            "notifications/progress" => parse(method, params, Self::Progress),
            "notifications/cancelled" => parse(method, params, Self::Cancelled),
            "notifications/message" => parse(method, params, Self::LoggingMessage),
            other => Self::Other {
                method: other.to_string(),
                params,
            },
        }
    }
}

fn parse<P: serde::de::DeserializeOwned>(
    method: &str,
    params: Option<Value>,
    wrap: impl FnOnce(P) -> SessionNotification,
) -> SessionNotification {
    let Some(value) = params else {
        warn!(method, "notification missing params");
        return SessionNotification::Other {
            method: method.to_string(),
            params: None,
        };
    };
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => wrap(parsed),
        Err(e) => {
            warn!(method, "malformed notification params: {e}");
            SessionNotification::Other {
                method: method.to_string(),
                params: Some(value),
            }
        }
    }
}

type SubscriberCallback = Arc<dyn Fn(&SessionNotification) + Send + Sync>;

/// Subscriber set for one session.
pub(crate) struct NotificationRegistry {
    subscribers: Mutex<HashMap<u64, SubscriberCallback>>,
    next_id: AtomicU64,
}

impl NotificationRegistry {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, callback: SubscriberCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, callback);
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.subscribers.lock().remove(&id);
    }

    /// Deliver to every subscriber. Callbacks are cloned out of the lock
    /// first, so a callback may itself subscribe or unsubscribe.
    pub(crate) fn publish(&self, notification: &SessionNotification) {
        let callbacks: Vec<SubscriberCallback> =
            self.subscribers.lock().values().cloned().collect();
        for callback in callbacks {
            callback(notification);
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Handle for one notification subscription.
///
/// Dropping the handle deregisters the subscriber; [`Self::unsubscribe`]
/// does the same explicitly.
#[derive(Debug)]
pub struct NotificationSubscription {
    registry: Weak<NotificationRegistry>,
    id: u64,
}

impl NotificationSubscription {
    pub(crate) fn new(registry: &Arc<NotificationRegistry>, id: u64) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            id,
        }
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(self) {}
}

impl Drop for NotificationSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
