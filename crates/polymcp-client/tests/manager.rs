//! Aggregation facade behavior that needs no live servers.

use std::sync::Arc;

use serde_json::json;

use polymcp_client::{ClientError, DetailLevel, McpClient, ServerManager, ServerStatus};

fn manager_with_two_servers() -> ServerManager {
    let client = McpClient::from_value(json!({
        "mcpServers": {
            "files": {"type": "stdio", "command": "/nonexistent/mcp-files"},
            "weather": {"type": "streamable_http", "url": "https://weather.example/mcp"}
        }
    }))
    .unwrap();
    ServerManager::new(Arc::new(client))
}

#[tokio::test]
async fn list_servers_shows_configured_but_unconnected_servers() {
    let manager = manager_with_two_servers();
    let statuses = manager.list_servers();
    assert_eq!(
        statuses,
        vec![
            ServerStatus {
                name: "files".to_string(),
                state: None,
            },
            ServerStatus {
                name: "weather".to_string(),
                state: None,
            },
        ]
    );
}

#[tokio::test]
async fn search_without_sessions_finds_nothing() {
    let manager = manager_with_two_servers();
    let hits = manager.search_tools(None, DetailLevel::FullSchema).await;
    assert!(hits.is_empty());
}

#[tokio::test]
async fn call_tool_requires_a_qualified_name() {
    let manager = manager_with_two_servers();

    let err = manager.call_tool("unqualified", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Config(_)), "got {err:?}");

    // Qualified, but no session exists for the server.
    let err = manager.call_tool("weather.get_forecast", None).await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownSession(_)), "got {err:?}");
}

#[tokio::test]
async fn connect_server_propagates_creation_failures() {
    let manager = manager_with_two_servers();

    let err = manager.connect_server("files").await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "got {err:?}");

    let err = manager.connect_server("ghost").await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownServer(_)), "got {err:?}");

    // The failed attempt is visible in the inventory.
    let statuses = manager.list_servers();
    let files = statuses.iter().find(|s| s.name == "files").unwrap();
    assert!(files.state.is_some());
}

#[tokio::test]
async fn disconnect_server_tolerates_absent_sessions() {
    let manager = manager_with_two_servers();
    manager.disconnect_server("weather").await.unwrap();
}
