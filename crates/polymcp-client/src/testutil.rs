//! Scripted in-process server for exercising sessions end to end.
//!
//! One half of a duplex pipe backs a raw-stream stdio transport; the other
//! half is driven by the test, reading the client's newline-delimited
//! JSON-RPC and writing canned replies.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

use polymcp_transport::{StdioTransport, Transport};

use crate::config::{ServerConfig, TransportSpec};
use crate::session::{Session, SessionOptions};

pub(crate) struct ScriptedServer {
    reader: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl ScriptedServer {
    /// Next message the client sent.
    pub(crate) async fn recv(&mut self) -> Value {
        let line = self
            .reader
            .next_line()
            .await
            .unwrap()
            .expect("client closed the stream");
        serde_json::from_str(&line).unwrap()
    }

    /// Write one message to the client.
    pub(crate) async fn send(&mut self, value: Value) {
        let mut line = value.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    /// Answer the next request, asserting it carries `method`.
    pub(crate) async fn respond(&mut self, method: &str, result: Value) {
        let request = self.recv().await;
        assert_eq!(request["method"], method, "unexpected request: {request}");
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    /// Serve the initialize exchange and swallow the initialized
    /// notification.
    pub(crate) async fn handle_initialize(&mut self) {
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

/// Idle session wired to a scripted far end.
pub(crate) fn scripted_session(name: &str) -> (Session, ScriptedServer) {
    let (client_end, server_end) = tokio::io::duplex(4096);
    let (client_read, client_write) = tokio::io::split(client_end);
    let (server_read, server_write) = tokio::io::split(server_end);

    let transport: Arc<dyn Transport> =
        Arc::new(StdioTransport::from_raw(client_read, client_write));
    let config = ServerConfig::new(TransportSpec::Stdio {
        command: "scripted".to_string(),
        args: Vec::new(),
        env: Default::default(),
        cwd: None,
    });
    let session = Session::with_transport(name, config, SessionOptions::default(), transport);

    let server = ScriptedServer {
        reader: BufReader::new(server_read).lines(),
        writer: server_write,
    };
    (session, server)
}

/// Session brought all the way to `ready` against the scripted far end.
pub(crate) async fn ready_session(name: &str) -> (Session, ScriptedServer) {
    let (session, mut server) = scripted_session(name);
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
