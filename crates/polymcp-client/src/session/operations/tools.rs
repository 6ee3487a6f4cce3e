//! Tool discovery and invocation.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use polymcp_protocol::types::{CallToolRequest, CallToolResult, ListToolsResult, Tool};

use crate::error::ClientResult;
use crate::session::Session;

impl Session {
    /// Every tool the server offers, across all pages.
    ///
    /// Served from the capability cache while it is fresh; a stale or
    /// unpopulated cache triggers a full refetch first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error
    /// from the refetch.
    pub async fn list_tools(&self) -> ClientResult<Vec<Tool>> {
        self.ensure_ready()?;
        if let Some(tools) = self.inner.tools.fresh() {
            return Ok(tools);
        }
        self.refresh_tools().await
    }

    /// Invoke `name` with `arguments`, waiting as long as the call takes
    /// (unless the session carries a default request timeout).
    ///
    /// A tool-level failure comes back as `CallToolResult::is_error`, not
    /// as an `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<HashMap<String, Value>>,
    ) -> ClientResult<CallToolResult> {
        self.call_tool_with_deadline(name, arguments, None).await
    }

    /// Invoke `name` with `arguments`, abandoning the wait after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`](crate::ClientError::Timeout) when
    /// the deadline passes; otherwise as [`Session::call_tool`].
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Option<HashMap<String, Value>>,
        timeout: Duration,
    ) -> ClientResult<CallToolResult> {
        self.call_tool_with_deadline(name, arguments, Some(timeout))
            .await
    }

    async fn call_tool_with_deadline(
        &self,
        name: &str,
        arguments: Option<HashMap<String, Value>>,
        timeout: Option<Duration>,
    ) -> ClientResult<CallToolResult> {
        self.ensure_ready()?;
        let request = CallToolRequest {
            name: name.to_string(),
            arguments,
        };
        self.call("tools/call", Some(serde_json::to_value(&request)?), timeout)
            .await
    }

    /// Fetch all tool pages and repopulate the cache.
    pub(crate) async fn refresh_tools(&self) -> ClientResult<Vec<Tool>> {
        let mut tools: Vec<Tool> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = self.call("tools/list", params, None).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(server = %self.inner.name, count = tools.len(), "tool list refreshed");
        self.inner.tools.replace(tools.clone());
        Ok(tools)
    }
}
