//! End-to-end session behavior against a scripted in-process server.
//!
//! The far end of a duplex pipe plays the server: it reads the client's
//! newline-delimited JSON-RPC and answers from the test body, so every
//! exchange is deterministic.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;

use polymcp_client::{
    ClientError, ServerConfig, Session, SessionNotification, SessionOptions, SessionState,
    TransportSpec,
};
use polymcp_protocol::types::Root;
use polymcp_transport::{StdioTransport, Transport};

struct ScriptedServer {
    reader: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl ScriptedServer {
    async fn recv(&mut self) -> Value {
        let line = self
            .reader
            .next_line()
            .await
            .unwrap()
            .expect("client closed the stream");
        serde_json::from_str(&line).unwrap()
    }

    async fn send(&mut self, value: Value) {
        let mut line = value.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn respond(&mut self, method: &str, result: Value) {
        let request = self.recv().await;
        assert_eq!(request["method"], method, "unexpected request: {request}");
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    async fn handle_initialize(&mut self) {
        let request = self.recv().await;
        assert_eq!(request["method"], "initialize");
        self.send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {
                "protocolVersion": "2025-06-18",
                "capabilities": {
                    "tools": {"listChanged": true},
                    "resources": {"subscribe": true, "listChanged": true},
                    "prompts": {"listChanged": true}
                },
                "serverInfo": {"name": "scripted", "version": "0.0.1"}
            }
        }))
        .await;
        let initialized = self.recv().await;
        assert_eq!(initialized["method"], "notifications/initialized");
    }
}

fn stdio_spec() -> TransportSpec {
    TransportSpec::Stdio {
        command: "scripted".to_string(),
        args: Vec::new(),
        env: Default::default(),
        cwd: None,
    }
}

fn build_session(
    name: &str,
    config: ServerConfig,
    options: SessionOptions,
) -> (Session, ScriptedServer) {
    let (client_end, server_end) = tokio::io::duplex(4096);
    let (client_read, client_write) = tokio::io::split(client_end);
    let (server_read, server_write) = tokio::io::split(server_end);

    let transport: Arc<dyn Transport> =
        Arc::new(StdioTransport::from_raw(client_read, client_write));
    let session = Session::with_transport(name, config, options, transport);
    let server = ScriptedServer {
        reader: BufReader::new(server_read).lines(),
        writer: server_write,
    };
    (session, server)
}

fn scripted_session(name: &str) -> (Session, ScriptedServer) {
    build_session(
        name,
        ServerConfig::new(stdio_spec()),
        SessionOptions::default(),
    )
}

async fn ready_session(name: &str) -> (Session, ScriptedServer) {
    ready_session_with(name, SessionOptions::default()).await
}

async fn ready_session_with(name: &str, options: SessionOptions) -> (Session, ScriptedServer) {
    let (session, mut server) = build_session(name, ServerConfig::new(stdio_spec()), options);
    let driver = {
        let session = session.clone();
        tokio::spawn(async move {
            session.connect().await.unwrap();
            session.initialize().await.unwrap();
        })
    };
    server.handle_initialize().await;
    driver.await.unwrap();
    (session, server)
}

#[tokio::test]
async fn connect_then_initialize_reaches_ready() {
    let (session, mut server) = scripted_session("hello");
    assert_eq!(session.state(), SessionState::Idle);

    let driver = {
        let session = session.clone();
        tokio::spawn(async move {
            session.connect().await.unwrap();
            assert_eq!(session.state(), SessionState::Initializing);
            session.initialize().await.unwrap();
        })
    };
    server.handle_initialize().await;
    driver.await.unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.server_info().unwrap().name, "scripted");
    let capabilities = session.server_capabilities().unwrap();
    assert!(capabilities.tools.is_some());
}

#[tokio::test]
async fn operations_and_initialize_respect_the_state_machine() {
    let (session, mut server) = scripted_session("strict");

    // No shortcut from idle to anything but connect.
    let err = session.list_tools().await.unwrap_err();
    assert!(
        matches!(&err, ClientError::NotReady { state, .. } if *state == SessionState::Idle),
        "got {err:?}"
    );
    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidTransition { .. }), "got {err:?}");

    let driver = {
        let session = session.clone();
        tokio::spawn(async move {
            session.connect().await.unwrap();
            // A second connect is off the edge table.
            let err = session.connect().await.unwrap_err();
            assert!(matches!(err, ClientError::InvalidTransition { .. }), "got {err:?}");
            session.initialize().await.unwrap();
        })
    };
    server.handle_initialize().await;
    driver.await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn list_tools_concatenates_pages_in_order() {
    let (session, mut server) = ready_session("paged").await;

    let list = {
        let session = session.clone();
        tokio::spawn(async move { session.list_tools().await })
    };

    let first = server.recv().await;
    assert_eq!(first["method"], "tools/list");
    assert!(first.get("params").is_none(), "first page has no cursor");
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": first["id"],
            "result": {
                "tools": [
                    {"name": "alpha", "inputSchema": {"type": "object"}},
                    {"name": "beta", "inputSchema": {"type": "object"}}
                ],
                "nextCursor": "page-2"
            }
        }))
        .await;

    let second = server.recv().await;
    assert_eq!(second["params"]["cursor"], "page-2");
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": second["id"],
            "result": {"tools": [{"name": "gamma", "inputSchema": {"type": "object"}}]}
        }))
        .await;

    let tools = list.await.unwrap().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);

    // Cached now; a second read makes no traffic the far end would have to
    // script.
    let again = session.list_tools().await.unwrap();
    assert_eq!(again.len(), 3);
}

#[tokio::test]
async fn list_changed_marks_the_cache_stale() {
    let options = SessionOptions {
        auto_refresh: false,
        request_timeout: None,
    };
    let (session, mut server) = ready_session_with("toolsrv", options).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = session.on_notification(move |n| {
        if matches!(n, SessionNotification::ToolsListChanged) {
            let _ = tx.send(());
        }
    });

    let list = {
        let session = session.clone();
        tokio::spawn(async move { session.list_tools().await })
    };
    server
        .respond(
            "tools/list",
            json!({"tools": [{"name": "alpha", "inputSchema": {"type": "object"}}]}),
        )
        .await;
    let before = list.await.unwrap().unwrap();
    assert_eq!(before.len(), 1);

    server
        .send(json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}))
        .await;
    // The cache is invalidated before subscribers hear about the change.
    rx.recv().await.unwrap();

    let list = {
        let session = session.clone();
        tokio::spawn(async move { session.list_tools().await })
    };
    server
        .respond(
            "tools/list",
            json!({"tools": [
                {"name": "alpha", "inputSchema": {"type": "object"}},
                {"name": "beta", "inputSchema": {"type": "object"}}
            ]}),
        )
        .await;
    let after = list.await.unwrap().unwrap();
    assert_eq!(after.len(), 2);
    assert_ne!(before.len(), after.len());
}

#[tokio::test]
async fn list_changed_triggers_a_background_refetch() {
    let (session, mut server) = ready_session("eager").await;

    server
        .send(json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}))
        .await;

    // The refetch arrives without any client-side call.
    let request = server.recv().await;
    assert_eq!(request["method"], "tools/list");
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {"tools": [{"name": "fresh", "inputSchema": {"type": "object"}}]}
        }))
        .await;

    // Exactly one refetch; the session settles.
    tokio::select! {
        extra = server.recv() => panic!("unexpected extra request: {extra}"),
        () = tokio::time::sleep(Duration::from_millis(200)) => {}
    }

    let tools = tokio::time::timeout(Duration::from_secs(2), session.list_tools())
        .await
        .expect("refreshed list should be served from cache")
        .unwrap();
    assert_eq!(tools[0].name, "fresh");
}

#[tokio::test]
async fn call_tool_timeout_is_opt_in() {
    let (session, mut server) = ready_session("slow").await;

    // With a deadline: the server stays silent and the call times out.
    let call = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .call_tool_with_timeout("stall", None, Duration::from_millis(100))
                .await
        })
    };
    let request = server.recv().await;
    assert_eq!(request["method"], "tools/call");
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }), "got {err:?}");

    // Without one: the call outlives a delay well past that deadline.
    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call_tool("patient", None).await })
    };
    let request = server.recv().await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {"content": [{"type": "text", "text": "done"}]}
        }))
        .await;
    let result = call.await.unwrap().unwrap();
    assert_eq!(result.content.len(), 1);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn roots_readback_is_last_write_wins() {
    let (session, mut server) = ready_session("rooty").await;

    session
        .set_roots(vec![Root::new("file:///alpha")])
        .await
        .unwrap();
    let changed = server.recv().await;
    assert_eq!(changed["method"], "notifications/roots/list_changed");

    server
        .send(json!({"jsonrpc": "2.0", "id": "srv-1", "method": "roots/list"}))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["id"], "srv-1");
    assert_eq!(reply["result"]["roots"][0]["uri"], "file:///alpha");

    session
        .set_roots(vec![Root::new("file:///beta")])
        .await
        .unwrap();
    let changed = server.recv().await;
    assert_eq!(changed["method"], "notifications/roots/list_changed");

    server
        .send(json!({"jsonrpc": "2.0", "id": "srv-2", "method": "roots/list"}))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["result"]["roots"].as_array().unwrap().len(), 1);
    assert_eq!(reply["result"]["roots"][0]["uri"], "file:///beta");
}

#[tokio::test]
async fn configured_roots_are_announced_after_the_handshake() {
    let mut config = ServerConfig::new(stdio_spec());
    config.roots = vec![Root::new("file:///workspace")];
    let (session, mut server) = build_session("rooted", config, SessionOptions::default());

    let driver = {
        let session = session.clone();
        tokio::spawn(async move {
            session.connect().await.unwrap();
            session.initialize().await.unwrap();
        })
    };
    server.handle_initialize().await;
    let announce = server.recv().await;
    assert_eq!(announce["method"], "notifications/roots/list_changed");
    driver.await.unwrap();

    assert_eq!(session.roots()[0].uri, "file:///workspace");
}

#[tokio::test]
async fn server_requests_are_answered_inline() {
    let (session, mut server) = ready_session("answering").await;

    server
        .send(json!({"jsonrpc": "2.0", "id": "srv-ping", "method": "ping"}))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["id"], "srv-ping");
    assert!(reply["result"].is_object());

    server
        .send(json!({"jsonrpc": "2.0", "id": "srv-odd", "method": "sampling/createMessage"}))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["id"], "srv-odd");
    assert_eq!(reply["error"]["code"], -32601);

    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn notifications_fan_out_in_arrival_order() {
    let (session, mut server) = ready_session("noisy").await;

    fn describe(notification: &SessionNotification) -> String {
        match notification {
            SessionNotification::ResourceUpdated(params) => format!("updated:{}", params.uri),
            SessionNotification::Progress(params) => format!("progress:{}", params.progress),
            SessionNotification::LoggingMessage(_) => "message".to_string(),
            SessionNotification::Other { method, .. } => format!("other:{method}"),
            other => other.method().to_string(),
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = session.on_notification(move |n| {
        let _ = tx.send(describe(n));
    });

    server
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/resources/updated",
            "params": {"uri": "file:///watched"}
        }))
        .await;
    server
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {"progressToken": "op-1", "progress": 0.5}
        }))
        .await;
    server
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/message",
            "params": {"level": "info", "data": "hello"}
        }))
        .await;
    server
        .send(json!({"jsonrpc": "2.0", "method": "custom/sideband", "params": {"n": 1}}))
        .await;

    assert_eq!(rx.recv().await.unwrap(), "updated:file:///watched");
    assert_eq!(rx.recv().await.unwrap(), "progress:0.5");
    assert_eq!(rx.recv().await.unwrap(), "message");
    assert_eq!(rx.recv().await.unwrap(), "other:custom/sideband");
}

#[tokio::test]
async fn unexpected_close_fails_the_session_and_interrupts_calls() {
    let (session, mut server) = ready_session("flaky").await;

    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call_tool("never", None).await })
    };
    let _request = server.recv().await;
    drop(server);

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Closed(_)), "got {err:?}");

    for _ in 0..100 {
        if session.state() == SessionState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.state(), SessionState::Failed);

    let err = session.ping().await.unwrap_err();
    assert!(
        matches!(&err, ClientError::NotReady { state, .. } if *state == SessionState::Failed),
        "got {err:?}"
    );
}

#[tokio::test]
async fn unsupported_protocol_version_fails_the_handshake() {
    let (session, mut server) = scripted_session("ancient");

    let driver = {
        let session = session.clone();
        tokio::spawn(async move {
            session.connect().await.unwrap();
            session.initialize().await
        })
    };
    let request = server.recv().await;
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {
                "protocolVersion": "1999-01-01",
                "capabilities": {},
                "serverInfo": {"name": "ancient", "version": "0"}
            }
        }))
        .await;

    let err = driver.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Handshake(_)), "got {err:?}");
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn protocol_errors_are_request_scoped() {
    let (session, mut server) = ready_session("touchy").await;

    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call_tool("bad", None).await })
    };
    let request = server.recv().await;
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": -32602, "message": "bad params"}
        }))
        .await;

    let err = call.await.unwrap().unwrap_err();
    match err {
        ClientError::Protocol { code, message } => {
            assert_eq!(code, -32602);
            assert_eq!(message, "bad params");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The session survives and keeps working.
    assert_eq!(session.state(), SessionState::Ready);
    let ping = {
        let session = session.clone();
        tokio::spawn(async move { session.ping().await })
    };
    server.respond("ping", json!({})).await;
    ping.await.unwrap().unwrap();
}

#[tokio::test]
async fn resource_reads_and_subscriptions_round_trip() {
    let (session, mut server) = ready_session("library").await;

    let read = {
        let session = session.clone();
        tokio::spawn(async move { session.read_resource("file:///notes.txt").await })
    };
    server
        .respond(
            "resources/read",
            json!({"contents": [{
                "uri": "file:///notes.txt",
                "mimeType": "text/plain",
                "text": "remember the milk"
            }]}),
        )
        .await;
    let result = read.await.unwrap().unwrap();
    assert_eq!(result.contents.len(), 1);

    let subscribe = {
        let session = session.clone();
        tokio::spawn(async move { session.subscribe_resource("file:///notes.txt").await })
    };
    let request = server.recv().await;
    assert_eq!(request["method"], "resources/subscribe");
    assert_eq!(request["params"]["uri"], "file:///notes.txt");
    server
        .send(json!({"jsonrpc": "2.0", "id": request["id"], "result": {}}))
        .await;
    subscribe.await.unwrap().unwrap();

    let unsubscribe = {
        let session = session.clone();
        tokio::spawn(async move { session.unsubscribe_resource("file:///notes.txt").await })
    };
    let request = server.recv().await;
    assert_eq!(request["method"], "resources/unsubscribe");
    server
        .send(json!({"jsonrpc": "2.0", "id": request["id"], "result": {}}))
        .await;
    unsubscribe.await.unwrap().unwrap();
}

#[tokio::test]
async fn prompts_list_and_expand() {
    let (session, mut server) = ready_session("prompter").await;

    let list = {
        let session = session.clone();
        tokio::spawn(async move { session.list_prompts().await })
    };
    server
        .respond(
            "prompts/list",
            json!({"prompts": [{"name": "greet", "description": "Say hello"}]}),
        )
        .await;
    let prompts = list.await.unwrap().unwrap();
    assert_eq!(prompts[0].name, "greet");

    let get = {
        let session = session.clone();
        tokio::spawn(async move {
            let arguments = std::collections::HashMap::from([(
                "name".to_string(),
                "Ada".to_string(),
            )]);
            session.get_prompt("greet", Some(arguments)).await
        })
    };
    let request = server.recv().await;
    assert_eq!(request["method"], "prompts/get");
    assert_eq!(request["params"]["arguments"]["name"], "Ada");
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {"messages": [{
                "role": "user",
                "content": {"type": "text", "text": "Hello Ada"}
            }]}
        }))
        .await;
    let expanded = get.await.unwrap().unwrap();
    assert_eq!(expanded.messages.len(), 1);
}

#[tokio::test]
async fn disconnect_is_total_and_idempotent() {
    // From idle, without ever connecting.
    let (session, _server) = scripted_session("early");
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    session.disconnect().await.unwrap();

    // From ready.
    let (session, _server) = ready_session("late").await;
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let err = session.ping().await.unwrap_err();
    assert!(
        matches!(&err, ClientError::NotReady { state, .. } if *state == SessionState::Closed),
        "got {err:?}"
    );
}
