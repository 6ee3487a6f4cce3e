//! Resource discovery, reads, and update subscriptions.

use serde_json::json;
use tracing::debug;

use polymcp_protocol::types::{
    EmptyResult, ListResourcesResult, ReadResourceRequest, ReadResourceResult, Resource,
    SubscribeRequest, UnsubscribeRequest,
};

use crate::error::ClientResult;
use crate::session::Session;

impl Session {
    /// Every resource the server exposes, across all pages.
    ///
    /// Served from the capability cache while it is fresh; a stale or
    /// unpopulated cache triggers a full refetch first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error
    /// from the refetch.
    pub async fn list_resources(&self) -> ClientResult<Vec<Resource>> {
        self.ensure_ready()?;
        if let Some(resources) = self.inner.resources.fresh() {
            return Ok(resources);
        }
        self.refresh_resources().await
    }

    /// Read the contents behind `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error.
    pub async fn read_resource(&self, uri: &str) -> ClientResult<ReadResourceResult> {
        self.ensure_ready()?;
        let request = ReadResourceRequest {
            uri: uri.to_string(),
        };
        self.call(
            "resources/read",
            Some(serde_json::to_value(&request)?),
            None,
        )
        .await
    }

    /// Ask the server to emit `notifications/resources/updated` for `uri`.
    ///
    /// Updates arrive through [`Session::on_notification`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error.
    pub async fn subscribe_resource(&self, uri: &str) -> ClientResult<()> {
        self.ensure_ready()?;
        let request = SubscribeRequest {
            uri: uri.to_string(),
        };
        let _: EmptyResult = self
            .call(
                "resources/subscribe",
                Some(serde_json::to_value(&request)?),
                None,
            )
            .await?;
        Ok(())
    }

    /// Cancel a previous [`Session::subscribe_resource`] for `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error.
    pub async fn unsubscribe_resource(&self, uri: &str) -> ClientResult<()> {
        self.ensure_ready()?;
        let request = UnsubscribeRequest {
            uri: uri.to_string(),
        };
        let _: EmptyResult = self
            .call(
                "resources/unsubscribe",
                Some(serde_json::to_value(&request)?),
                None,
            )
            .await?;
        Ok(())
    }

    /// Fetch all resource pages and repopulate the cache.
    pub(crate) async fn refresh_resources(&self) -> ClientResult<Vec<Resource>> {
        let mut resources: Vec<Resource> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListResourcesResult = self.call("resources/list", params, None).await?;
            resources.extend(page.resources);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(server = %self.inner.name, count = resources.len(), "resource list refreshed");
        self.inner.resources.replace(resources.clone());
        Ok(resources)
    }
}
