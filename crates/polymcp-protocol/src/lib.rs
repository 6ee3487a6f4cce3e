//! # polymcp-protocol
//!
//! JSON-RPC 2.0 envelope and the MCP type vocabulary used by the polymcp
//! client engine. Pure data definitions: everything here is serde in and
//! serde out, with no I/O and no runtime dependencies.
//!
//! - [`jsonrpc`] — requests, notifications, responses, error objects, and the
//!   untagged [`jsonrpc::JsonRpcMessage`] classifier.
//! - [`types`] — initialize exchange, capability declarations, tools,
//!   resources, prompts, roots, and notification parameter payloads.

pub mod jsonrpc;
pub mod types;

pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion, RequestId, ResponseId,
};

/// Message ID (same as `RequestId`)
pub type MessageId = RequestId;

/// Protocol revision this client proposes during the handshake.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol revisions this client accepts from a server, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Hard ceiling on a single message, applied by every transport.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
