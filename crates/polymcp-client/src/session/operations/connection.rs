//! Connection-level operations: liveness and roots.

use polymcp_protocol::types::{EmptyResult, Root};

use crate::error::ClientResult;
use crate::session::Session;

impl Session {
    /// Liveness probe. Uses the same waiter machinery as every other
    /// request, so a dead connection surfaces here too.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport or protocol error.
    pub async fn ping(&self) -> ClientResult<()> {
        self.ensure_ready()?;
        let _: EmptyResult = self.call("ping", None, None).await?;
        Ok(())
    }

    /// Replace the advertised roots. Last write wins.
    ///
    /// The server is notified with `notifications/roots/list_changed` on
    /// every call, even when the new set equals the old one, and re-reads
    /// the list through `roots/list`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`](crate::ClientError::NotReady)
    /// unless the session is `ready`, plus any transport error from the
    /// notification send.
    pub async fn set_roots(&self, roots: Vec<Root>) -> ClientResult<()> {
        self.ensure_ready()?;
        *self.inner.roots.lock() = roots;
        self.notify("notifications/roots/list_changed", None).await
    }
}
