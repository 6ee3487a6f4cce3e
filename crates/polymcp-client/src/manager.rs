//! Cross-server aggregation.
//!
//! [`ServerManager`] layers multi-server operations over a shared
//! [`McpClient`]: server inventory with lifecycle states, idempotent
//! connect, tool search with `server.tool` namespacing, and qualified tool
//! invocation. Per-server isolation carries through: one server's failure
//! shrinks a search result instead of failing it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use polymcp_protocol::types::{CallToolResult, ToolInputSchema};

use crate::error::{ClientError, ClientResult};
use crate::registry::McpClient;
use crate::session::{Session, SessionState};

/// How much of each tool a search result carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// Qualified names only
    #[default]
    Names,
    /// Names plus descriptions
    Descriptions,
    /// Names, descriptions, and input schemas
    FullSchema,
}

/// One configured server and the state of its session, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    /// Server name
    pub name: String,
    /// Session lifecycle state; `None` when no session exists
    pub state: Option<SessionState>,
}

/// One tool found by a search, namespaced by its server.
#[derive(Debug, Clone, Serialize)]
pub struct ToolHit {
    /// Server the tool lives on
    pub server: String,
    /// Qualified `server.tool` name, ready for [`ServerManager::call_tool`]
    pub name: String,
    /// Tool description, from [`DetailLevel::Descriptions`] up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input schema, only at [`DetailLevel::FullSchema`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<ToolInputSchema>,
}

/// Multi-server facade over one [`McpClient`].
#[derive(Debug, Clone)]
pub struct ServerManager {
    client: Arc<McpClient>,
}

impl ServerManager {
    /// Manager over `client`.
    pub fn new(client: Arc<McpClient>) -> Self {
        Self { client }
    }

    /// The underlying registry.
    pub fn client(&self) -> &Arc<McpClient> {
        &self.client
    }

    /// Inventory of servers and their session states, sorted by name.
    ///
    /// Purely observational: no connections are made.
    pub fn list_servers(&self) -> Vec<ServerStatus> {
        let mut names = self.client.get_server_names();
        for (name, _) in self.client.active_sessions() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let state = self.client.get_session(&name).map(|s| s.state());
                ServerStatus { name, state }
            })
            .collect()
    }

    /// Session for `name`, connecting and initializing one if none is
    /// `ready`. Idempotent for an already-ready server.
    ///
    /// # Errors
    ///
    /// As [`McpClient::create_session`].
    pub async fn connect_server(&self, name: &str) -> ClientResult<Session> {
        if let Some(session) = self.client.get_session(name) {
            if session.state() == SessionState::Ready {
                return Ok(session);
            }
        }
        self.client.create_session(name, true).await
    }

    /// Close the session for `name`, if any.
    ///
    /// # Errors
    ///
    /// As [`McpClient::close_session`].
    pub async fn disconnect_server(&self, name: &str) -> ClientResult<()> {
        self.client.close_session(name).await
    }

    /// Search tools across every `ready` session.
    ///
    /// `query` matches case-insensitively against tool names and
    /// descriptions; `None` lists everything. Sessions that are not ready
    /// are skipped, and a server whose listing fails is logged and skipped
    /// rather than failing the search.
    pub async fn search_tools(&self, query: Option<&str>, detail: DetailLevel) -> Vec<ToolHit> {
        let needle = query.map(str::to_lowercase);
        let mut hits = Vec::new();

        for (server, session) in self.client.active_sessions() {
            if session.state() != SessionState::Ready {
                continue;
            }
            let tools = match session.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(server = %server, "tool listing failed during search: {e}");
                    continue;
                }
            };
            for tool in tools {
                if let Some(needle) = &needle {
                    let name_matches = tool.name.to_lowercase().contains(needle);
                    let description_matches = tool
                        .description
                        .as_ref()
                        .is_some_and(|d| d.to_lowercase().contains(needle));
                    if !name_matches && !description_matches {
                        continue;
                    }
                }
                hits.push(ToolHit {
                    name: format!("{server}.{}", tool.name),
                    server: server.clone(),
                    description: match detail {
                        DetailLevel::Names => None,
                        DetailLevel::Descriptions | DetailLevel::FullSchema => tool.description,
                    },
                    input_schema: match detail {
                        DetailLevel::FullSchema => Some(tool.input_schema),
                        DetailLevel::Names | DetailLevel::Descriptions => None,
                    },
                });
            }
        }
        hits
    }

    /// Invoke a tool by its qualified `server.tool` name.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for a name without a `'.'`,
    /// [`ClientError::UnknownSession`] when the server has no session, and
    /// otherwise as [`Session::call_tool`].
    pub async fn call_tool(
        &self,
        qualified: &str,
        arguments: Option<HashMap<String, Value>>,
    ) -> ClientResult<CallToolResult> {
        let (server, tool) = qualified.split_once('.').ok_or_else(|| {
            ClientError::Config(format!(
                "tool name '{qualified}' must be qualified as 'server.tool'"
            ))
        })?;
        let session = self.client.require_session(server)?;
        session.call_tool(tool, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::config::{ServerConfig, TransportSpec};
    use crate::testutil::{ready_session, scripted_session};

    fn stdio_config() -> ServerConfig {
        ServerConfig::new(TransportSpec::Stdio {
            command: "scripted".to_string(),
            args: Vec::new(),
            env: Default::default(),
            cwd: None,
        })
    }

    #[tokio::test]
    async fn list_servers_reports_configs_and_session_states() {
        let client = Arc::new(McpClient::new());
        client.add_server("configured-only", stdio_config()).unwrap();
        let (ready, _server) = ready_session("live").await;
        client.seed_session("live", ready);

        let manager = ServerManager::new(Arc::clone(&client));
        let statuses = manager.list_servers();

        assert_eq!(
            statuses,
            vec![
                ServerStatus {
                    name: "configured-only".to_string(),
                    state: None,
                },
                ServerStatus {
                    name: "live".to_string(),
                    state: Some(SessionState::Ready),
                },
            ]
        );
    }

    #[tokio::test]
    async fn search_namespaces_hits_and_returns_only_matches() {
        let client = Arc::new(McpClient::new());
        let (files, mut files_srv) = ready_session("files").await;
        let (weather, mut weather_srv) = ready_session("weatherserver").await;
        client.seed_session("files", files);
        client.seed_session("weatherserver", weather);

        let manager = ServerManager::new(Arc::clone(&client));
        let search = tokio::spawn(async move {
            manager
                .search_tools(Some("weather"), DetailLevel::Names)
                .await
        });

        // Sessions are visited in name order.
        files_srv
            .respond(
                "tools/list",
                json!({"tools": [{"name": "read_file", "inputSchema": {"type": "object"}}]}),
            )
            .await;
        weather_srv
            .respond(
                "tools/list",
                json!({"tools": [{
                    "name": "get_weather",
                    "description": "Forecast for a city",
                    "inputSchema": {"type": "object"}
                }]}),
            )
            .await;

        let hits = search.await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].server, "weatherserver");
        assert_eq!(hits[0].name, "weatherserver.get_weather");
        assert_eq!(hits[0].description, None);
        assert!(hits[0].input_schema.is_none());
    }

    #[tokio::test]
    async fn detail_levels_shape_the_hits() {
        let client = Arc::new(McpClient::new());
        let (session, mut server) = ready_session("docs").await;
        client.seed_session("docs", session);
        let manager = ServerManager::new(Arc::clone(&client));

        let first = {
            let manager = manager.clone();
            tokio::spawn(
                async move { manager.search_tools(None, DetailLevel::FullSchema).await },
            )
        };
        server
            .respond(
                "tools/list",
                json!({"tools": [{
                    "name": "lookup",
                    "description": "Find a document",
                    "inputSchema": {"type": "object", "required": ["query"]}
                }]}),
            )
            .await;
        let full = first.await.unwrap();
        assert_eq!(full[0].description.as_deref(), Some("Find a document"));
        assert!(full[0].input_schema.is_some());

        // The cache is fresh now; later searches need no more traffic.
        let described = manager.search_tools(None, DetailLevel::Descriptions).await;
        assert_eq!(described[0].description.as_deref(), Some("Find a document"));
        assert!(described[0].input_schema.is_none());

        let names = manager.search_tools(None, DetailLevel::Names).await;
        assert_eq!(names[0].name, "docs.lookup");
        assert_eq!(names[0].description, None);
    }

    #[tokio::test]
    async fn search_skips_sessions_that_are_not_ready() {
        let client = Arc::new(McpClient::new());
        let (idle, _idle_srv) = scripted_session("idle");
        client.seed_session("idle", idle);

        let manager = ServerManager::new(Arc::clone(&client));
        let hits = manager.search_tools(None, DetailLevel::Names).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn call_tool_routes_on_the_qualified_name() {
        let client = Arc::new(McpClient::new());
        let (session, mut server) = ready_session("echo").await;
        client.seed_session("echo", session);
        let manager = ServerManager::new(Arc::clone(&client));

        let call = tokio::spawn(async move {
            let arguments = HashMap::from([("text".to_string(), json!("hi"))]);
            manager.call_tool("echo.say", Some(arguments)).await
        });

        let request = server.recv().await;
        assert_eq!(request["method"], "tools/call");
        assert_eq!(request["params"]["name"], "say");
        assert_eq!(request["params"]["arguments"]["text"], "hi");
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": {"content": [{"type": "text", "text": "hi"}]}
            }))
            .await;

        let result = call.await.unwrap().unwrap();
        assert_eq!(result.content.len(), 1);
    }

    #[tokio::test]
    async fn call_tool_rejects_unqualified_and_unknown_names() {
        let manager = ServerManager::new(Arc::new(McpClient::new()));

        let err = manager.call_tool("bare", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Config(_)), "got {err:?}");

        let err = manager.call_tool("ghost.tool", None).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownSession(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn connect_server_reuses_a_ready_session() {
        let client = Arc::new(McpClient::new());
        client.add_server("echo", stdio_config()).unwrap();
        let (session, _server) = ready_session("echo").await;
        client.seed_session("echo", session);

        let manager = ServerManager::new(Arc::clone(&client));
        let reused = manager.connect_server("echo").await.unwrap();
        assert_eq!(reused.state(), SessionState::Ready);
    }
}
