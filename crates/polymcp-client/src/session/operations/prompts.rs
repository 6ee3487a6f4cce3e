//! Prompt discovery and retrieval.

use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use polymcp_protocol::types::{GetPromptRequest, GetPromptResult, ListPromptsResult, Prompt};

use crate::error::ClientResult;
use crate::session::Session;

impl Session {
    /// Every prompt the server offers, across all pages.
    ///
    /// Served from the capability cache while it is fresh; a stale or
    /// unpopulated cache triggers a full refetch first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error
    /// from the refetch.
    pub async fn list_prompts(&self) -> ClientResult<Vec<Prompt>> {
        self.ensure_ready()?;
        if let Some(prompts) = self.inner.prompts.fresh() {
            return Ok(prompts);
        }
        self.refresh_prompts().await
    }

    /// Expand prompt `name` with `arguments` into concrete messages.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> ClientResult<GetPromptResult> {
        self.ensure_ready()?;
        let request = GetPromptRequest {
            name: name.to_string(),
            arguments,
        };
        self.call("prompts/get", Some(serde_json::to_value(&request)?), None)
            .await
    }

    /// Fetch all prompt pages and repopulate the cache.
    pub(crate) async fn refresh_prompts(&self) -> ClientResult<Vec<Prompt>> {
        let mut prompts: Vec<Prompt> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListPromptsResult = self.call("prompts/list", params, None).await?;
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(server = %self.inner.name, count = prompts.len(), "prompt list refreshed");
        self.inner.prompts.replace(prompts.clone());
        Ok(prompts)
    }
}
