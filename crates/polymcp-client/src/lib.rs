//! # polymcp-client
//!
//! Client engine for MCP servers, from single connection to fleet:
//!
//! - [`Session`] — one server connection behind one transport for its
//!   lifetime: checked lifecycle state machine, initialize handshake,
//!   request correlation, capability caches kept coherent by
//!   `list_changed` notifications, and notification fan-out to
//!   subscribers.
//! - [`OauthOverlay`] — interactive authorization layered on a session
//!   that lands in `pending_auth`: authorization-code flow through a
//!   host-supplied [`AuthorizationHandler`], token exchange, proxy
//!   fallback, and retry over fresh sessions.
//! - [`McpClient`] — registry mapping server names to configurations and
//!   live sessions, with per-server isolation and throw-free aggregate
//!   teardown.
//! - [`ServerManager`] — multi-server facade: inventory, cross-server
//!   tool search with `server.tool` namespacing, and qualified tool
//!   invocation.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use polymcp_client::{DetailLevel, McpClient, ServerManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(McpClient::from_value(serde_json::json!({
//!         "mcpServers": {
//!             "files": {"type": "stdio", "command": "mcp-files"},
//!             "weather": {"type": "streamable_http", "url": "https://weather.example/mcp"}
//!         }
//!     }))?);
//!
//!     for (server, error) in client.create_all_sessions(true).await {
//!         eprintln!("{server} failed to come up: {error}");
//!     }
//!
//!     let manager = ServerManager::new(Arc::clone(&client));
//!     for hit in manager.search_tools(Some("weather"), DetailLevel::Descriptions).await {
//!         println!("{} - {}", hit.name, hit.description.unwrap_or_default());
//!     }
//!     let forecast = manager.call_tool("weather.get_forecast", None).await?;
//!     println!("{forecast:?}");
//!
//!     client.close_all_sessions().await;
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod auth;
pub mod config;
pub mod error;
pub mod manager;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testutil;

pub use auth::{AuthConnectionType, AuthSnapshot, AuthorizationHandler, OauthOverlay};
pub use config::{AuthConfig, ClientConfig, OauthConfig, ServerConfig, TransportSpec};
pub use error::{ClientError, ClientResult};
pub use manager::{DetailLevel, ServerManager, ServerStatus, ToolHit};
pub use registry::McpClient;
pub use session::{
    NotificationSubscription, Session, SessionNotification, SessionOptions, SessionState,
};
