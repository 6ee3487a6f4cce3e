//! Connection configuration.
//!
//! [`ClientConfig`] follows the conventional `mcpServers` JSON shape: a map
//! of server names to per-server configurations, each naming a transport
//! kind plus optional roots and credentials.
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "files": {"type": "stdio", "command": "mcp-files", "args": ["--root", "/data"]},
//!     "weather": {"type": "streamable_http", "url": "https://weather.example/mcp"}
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use polymcp_protocol::types::Root;
use polymcp_transport::{
    HttpConfig, HttpTransport, StdioConfig, StdioTransport, StreamableConfig,
    StreamableHttpTransport, Transport, TransportType, WebSocketConfig, WebSocketTransport,
};

use crate::error::{ClientError, ClientResult};

/// Named server configurations, the unit the registry is built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server configurations keyed by name
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, ServerConfig>,
}

impl ClientConfig {
    /// Parse a configuration from an in-memory JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Serialization`] when the value does not match
    /// the expected shape.
    pub fn from_value(value: Value) -> ClientResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the file cannot be read and
    /// [`ClientError::Serialization`] when its contents do not parse.
    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Everything needed to reach and authorize against one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// How to reach the server
    #[serde(flatten)]
    pub transport: TransportSpec,
    /// Scope roots advertised to this server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<Root>,
    /// Credentials, when the server requires them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

impl ServerConfig {
    /// Configuration with a transport only.
    pub fn new(transport: TransportSpec) -> Self {
        Self {
            transport,
            roots: Vec::new(),
            auth: None,
        }
    }
}

/// Transport selection, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportSpec {
    /// Child process speaking newline-delimited JSON-RPC over stdio
    Stdio {
        /// Executable to spawn
        command: String,
        /// Arguments passed to the executable
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Environment overlaid on top of the inherited environment
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
        /// Working directory for the child
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    /// Plain HTTP request/response endpoint
    Http {
        /// Endpoint URL
        url: String,
        /// Additional headers attached to every request
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    /// Streamable HTTP endpoint with a server-sent-events channel
    StreamableHttp {
        /// Endpoint URL
        url: String,
        /// Additional headers attached to every request
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    /// WebSocket endpoint
    #[serde(rename = "websocket")]
    WebSocket {
        /// Endpoint URL (`ws://` or `wss://`)
        url: String,
        /// Additional headers attached to the upgrade request
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

impl TransportSpec {
    /// The transport kind this spec selects.
    pub fn transport_type(&self) -> TransportType {
        match self {
            Self::Stdio { .. } => TransportType::Stdio,
            Self::Http { .. } => TransportType::Http,
            Self::StreamableHttp { .. } => TransportType::StreamableHttp,
            Self::WebSocket { .. } => TransportType::WebSocket,
        }
    }
}

/// Credentials for one server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static bearer token attached to every request; short-circuits any
    /// interactive flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    /// Interactive OAuth authorization-code flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OauthConfig>,
}

/// OAuth authorization-code flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthConfig {
    /// Authorization endpoint the user is sent to
    pub authorization_endpoint: String,
    /// Token endpoint authorization codes are exchanged against
    pub token_endpoint: String,
    /// OAuth client identifier
    pub client_id: String,
    /// OAuth client secret; omitted for public clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Redirect URI registered for this client
    pub redirect_uri: String,
    /// Scopes requested during authorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Alternate endpoint URL to retry through when the direct connection
    /// is refused after authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

/// Build a disconnected transport for `config`.
pub(crate) fn build_transport(config: &ServerConfig) -> ClientResult<Arc<dyn Transport>> {
    build_transport_with_token(config, None)
}

/// Build a disconnected transport for `config`, preferring `token` over any
/// configured static bearer token. Stdio carries no credentials.
pub(crate) fn build_transport_with_token(
    config: &ServerConfig,
    token: Option<String>,
) -> ClientResult<Arc<dyn Transport>> {
    let token = effective_token(config, token);

    match &config.transport {
        TransportSpec::Stdio {
            command,
            args,
            env,
            cwd,
        } => {
            if command.is_empty() {
                return Err(ClientError::Config(
                    "stdio transport requires a command".to_string(),
                ));
            }
            let stdio = StdioConfig {
                command: command.clone(),
                args: args.clone(),
                env: env.clone(),
                cwd: cwd.clone(),
                ..StdioConfig::default()
            };
            Ok(Arc::new(StdioTransport::new(stdio)))
        }
        TransportSpec::Http { url, headers } => {
            let http = HttpConfig {
                url: url.clone(),
                auth_token: token,
                headers: headers.clone(),
                ..HttpConfig::default()
            };
            Ok(Arc::new(HttpTransport::new(http)?))
        }
        TransportSpec::StreamableHttp { url, headers } => {
            let streamable = StreamableConfig {
                url: url.clone(),
                auth_token: token,
                headers: headers.clone(),
                ..StreamableConfig::default()
            };
            Ok(Arc::new(StreamableHttpTransport::new(streamable)?))
        }
        TransportSpec::WebSocket { url, headers } => {
            let ws = WebSocketConfig {
                url: url.clone(),
                auth_token: token,
                headers: headers.clone(),
                ..WebSocketConfig::default()
            };
            Ok(Arc::new(WebSocketTransport::new(ws)))
        }
    }
}

/// Fresh token first, configured static token second.
fn effective_token(config: &ServerConfig, token: Option<String>) -> Option<String> {
    token.or_else(|| {
        config
            .auth
            .as_ref()
            .and_then(|auth| auth.bearer_token.clone())
    })
}
