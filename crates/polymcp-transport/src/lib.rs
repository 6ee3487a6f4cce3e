//! # polymcp-transport
//!
//! Connector layer for the polymcp client engine. Four transports carry
//! newline-free JSON-RPC payloads to an MCP server, all behind one
//! [`Transport`] trait:
//!
//! - [`StdioTransport`] — spawn a server subprocess and speak
//!   newline-delimited JSON over its stdin/stdout, with stderr forwarded to
//!   the log.
//! - [`HttpTransport`] — plain request/response over HTTP POST; server
//!   pushes are not available.
//! - [`StreamableHttpTransport`] — POST plus a long-lived SSE event stream
//!   with session tracking, `Last-Event-ID` resumption, and reconnection
//!   under a [`RetryPolicy`].
//! - [`WebSocketTransport`] — text frames over a single upgraded connection.
//!
//! Every transport queues inbound traffic internally: `receive()` parks
//! until a message arrives and returns `Ok(None)` exactly once the
//! connection is over. One task should own the receive loop; senders may be
//! cloned freely behind `Arc`.
//!
//! ```rust,no_run
//! use polymcp_transport::{StdioConfig, StdioTransport, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = StdioConfig::new("mcp-server");
//!     config.args = vec!["--stdio".into()];
//!
//!     let transport = StdioTransport::new(config);
//!     transport.connect().await?;
//!
//!     while let Some(message) = transport.receive().await? {
//!         println!("<- {}", message.as_text()?);
//!     }
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

pub mod error;
pub mod http;
pub mod message;
pub mod sse;
pub mod stdio;
pub mod streamable;
pub mod traits;
pub mod websocket;

pub use error::{TransportError, TransportResult};
pub use http::{HttpConfig, HttpTransport};
pub use message::TransportMessage;
pub use sse::{SseEvent, SseParser};
pub use stdio::{StdioConfig, StdioTransport};
pub use streamable::{RetryPolicy, StreamableConfig, StreamableHttpTransport};
pub use traits::{Transport, TransportState, TransportType};
pub use websocket::{WebSocketConfig, WebSocketTransport};
