//! JSON-RPC 2.0 envelope types.
//!
//! The client engine speaks plain JSON-RPC 2.0: requests carry an id and
//! expect a correlated response, notifications carry no id, and responses
//! hold exactly one of `result` or `error`. [`JsonRpcMessage`] is the
//! untagged union the per-session routing task uses to classify inbound
//! traffic.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation identifier for requests and responses.
///
/// The wire format permits string or integer ids; this client generates
/// integer ids from a per-session counter but accepts either form inbound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Numeric identifier
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        Self::Number(n as i64)
    }
}

/// JSON-RPC version marker; serializes as `"2.0"` and rejects anything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Request method name
    pub method: String,
    /// Request parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request identifier
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a request for `method` with optional parameters.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// JSON-RPC notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Notification method name
    pub method: String,
    /// Notification parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a notification for `method` with optional parameters.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// Response payload; mutual exclusion of `result` and `error` is enforced by
/// the type rather than validated after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// Successful response with result
    Success {
        /// Response result
        result: Value,
    },
    /// Error response
    Error {
        /// Response error
        error: JsonRpcError,
    },
}

/// Response ID; null only for parse-error responses that could not recover
/// the request id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// Response id echoing a request id.
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    /// Null id, used when the request id could not be parsed.
    pub fn null() -> Self {
        Self(None)
    }

    /// The request id, if present.
    pub fn as_request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }
}

/// JSON-RPC response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Response payload (either result or error, never both)
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    /// Request identifier
    pub id: ResponseId,
}

impl JsonRpcResponse {
    /// Successful response carrying `result`.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: ResponseId::from_request(id),
        }
    }

    /// Error response for the given request id (`None` for parse errors).
    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId(id),
        }
    }

    /// `true` if the payload is a result, not an error.
    pub fn is_success(&self) -> bool {
        matches!(self.payload, JsonRpcResponsePayload::Success { .. })
    }

    /// Consume the response, yielding the result or the error object.
    ///
    /// # Errors
    ///
    /// Returns the server-supplied [`JsonRpcError`] for error responses.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.payload {
            JsonRpcResponsePayload::Success { result } => Ok(result),
            JsonRpcResponsePayload::Error { error } => Err(error),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new JSON-RPC error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new JSON-RPC error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700)
    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    /// Invalid request (-32600)
    pub fn invalid_request() -> Self {
        Self::new(-32600, "Invalid Request")
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {method}"))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(details: &str) -> Self {
        Self::new(-32602, format!("Invalid params: {details}"))
    }

    /// Internal error (-32603)
    pub fn internal_error(details: &str) -> Self {
        Self::new(-32603, format!("Internal error: {details}"))
    }
}

/// Any JSON-RPC message, classified by shape.
///
/// Variant order matters for untagged deserialization: a request has both
/// `method` and `id`, a notification has `method` only, a response has `id`
/// with `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Request expecting a correlated response
    Request(JsonRpcRequest),
    /// Fire-and-forget notification
    Notification(JsonRpcNotification),
    /// Response to a prior request
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// The method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_round_trip() {
        let req = JsonRpcRequest::new(7i64, "tools/call", Some(json!({"name": "echo"})));
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(
            wire,
            json!({"jsonrpc": "2.0", "method": "tools/call", "params": {"name": "echo"}, "id": 7})
        );

        let back: JsonRpcRequest = serde_json::from_value(wire).unwrap();
        assert_eq!(back.id, RequestId::Number(7));
        assert_eq!(back.method, "tools/call");
    }

    #[test]
    fn notification_omits_id_and_empty_params() {
        let n = JsonRpcNotification::new("notifications/initialized", None);
        let wire = serde_json::to_value(&n).unwrap();
        assert_eq!(wire, json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
    }

    #[test]
    fn version_is_validated() {
        let bad = json!({"jsonrpc": "1.0", "method": "ping", "id": 1});
        assert!(serde_json::from_value::<JsonRpcRequest>(bad).is_err());
    }

    #[test]
    fn response_payload_is_exclusive() {
        let ok: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "result": {"x": 1}, "id": 3})).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.into_result().unwrap(), json!({"x": 1}));

        let err: JsonRpcResponse = serde_json::from_value(
            json!({"jsonrpc": "2.0", "error": {"code": -32601, "message": "nope"}, "id": 3}),
        )
        .unwrap();
        let e = err.into_result().unwrap_err();
        assert_eq!(e.code, -32601);
    }

    #[test]
    fn null_response_id_parses() {
        let resp: JsonRpcResponse = serde_json::from_value(
            json!({"jsonrpc": "2.0", "error": {"code": -32700, "message": "Parse error"}, "id": null}),
        )
        .unwrap();
        assert_eq!(resp.id, ResponseId::null());
    }

    #[test]
    fn message_classification() {
        let req: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "ping", "id": 1})).unwrap();
        assert!(matches!(req, JsonRpcMessage::Request(_)));

        let note: JsonRpcMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}),
        )
        .unwrap();
        assert!(matches!(note, JsonRpcMessage::Notification(_)));
        assert_eq!(note.method(), Some("notifications/tools/list_changed"));

        let resp: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "result": {}, "id": 1})).unwrap();
        assert!(matches!(resp, JsonRpcMessage::Response(_)));
    }

    #[test]
    fn string_and_number_ids_coexist() {
        let a: RequestId = serde_json::from_value(json!("abc")).unwrap();
        let b: RequestId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(a, RequestId::String("abc".into()));
        assert_eq!(b, RequestId::Number(42));
        assert_eq!(a.to_string(), "abc");
        assert_eq!(b.to_string(), "42");
    }
}
