//! Child-process transport speaking newline-delimited JSON over stdio.
//!
//! `connect()` spawns the configured command with piped stdio and starts a
//! background reader task that forwards parsed lines into a bounded channel.
//! The raw-stream constructor skips the subprocess entirely and runs the same
//! framing over caller-provided streams, which is how the in-process test
//! servers are wired up.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use polymcp_protocol::{MAX_MESSAGE_SIZE, MessageId};

use crate::error::{TransportError, TransportResult};
use crate::message::TransportMessage;
use crate::traits::{Transport, TransportState, TransportType};

type BoxedReader = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedWriter = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type LineWriter = FramedWrite<BoxedWriter, LinesCodec>;

/// Configuration for a stdio child-process server.
#[derive(Debug, Clone)]
pub struct StdioConfig {
    /// Executable to spawn
    pub command: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Environment overlaid on top of the inherited environment
    pub env: HashMap<String, String>,
    /// Working directory for the child, if different from the parent's
    pub cwd: Option<PathBuf>,
    /// How long to wait for the child to exit after stdin closes
    pub shutdown_timeout: Duration,
    /// Maximum accepted line length in bytes
    pub max_message_size: usize,
    /// Inbound channel capacity before the reader task applies backpressure
    pub channel_capacity: usize,
}

impl StdioConfig {
    /// Configuration for `command` with default limits.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            shutdown_timeout: Duration::from_secs(5),
            max_message_size: MAX_MESSAGE_SIZE,
            channel_capacity: 1000,
        }
    }
}

/// Where the byte streams come from.
enum StreamSource {
    /// Spawn the configured command and use its pipes
    Subprocess,
    /// Caller-provided streams, consumed on first connect
    Raw {
        reader: Option<BoxedReader>,
        writer: Option<BoxedWriter>,
    },
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subprocess => write!(f, "Subprocess"),
            Self::Raw { .. } => write!(f, "Raw"),
        }
    }
}

/// Transport over a child process's stdin/stdout, one JSON-RPC envelope per
/// line.
pub struct StdioTransport {
    config: StdioConfig,
    state: Mutex<TransportState>,
    source: TokioMutex<StreamSource>,
    writer: TokioMutex<Option<LineWriter>>,
    inbound: TokioMutex<Option<mpsc::Receiver<TransportMessage>>>,
    child: TokioMutex<Option<Child>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdioTransport")
            .field("command", &self.config.command)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Transport that will spawn `config.command` on connect.
    ///
    /// The child is spawned with `kill_on_drop`, so dropping the transport
    /// without a prior `disconnect()` still reaps the process.
    pub fn new(config: StdioConfig) -> Self {
        Self::with_source(config, StreamSource::Subprocess)
    }

    /// Transport over caller-provided streams; no process is spawned.
    pub fn from_raw<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        Self::with_source(
            StdioConfig::default(),
            StreamSource::Raw {
                reader: Some(Box::pin(reader)),
                writer: Some(Box::pin(writer)),
            },
        )
    }

    fn with_source(config: StdioConfig, source: StreamSource) -> Self {
        Self {
            config,
            state: Mutex::new(TransportState::Disconnected),
            source: TokioMutex::new(source),
            writer: TokioMutex::new(None),
            inbound: TokioMutex::new(None),
            child: TokioMutex::new(None),
            reader_task: Mutex::new(None),
            stderr_task: Mutex::new(None),
        }
    }

    fn set_state(&self, next: TransportState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!("Stdio transport state: {} -> {}", state, next);
            *state = next;
        }
    }

    async fn spawn_child(&self) -> TransportResult<(BoxedReader, BoxedWriter)> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "failed to spawn {}: {e}",
                self.config.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed("child stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let command_name = self.config.command.clone();
            let handle = tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("server stderr ({}): {}", command_name, line);
                }
            });
            *self.stderr_task.lock() = Some(handle);
        }

        *self.child.lock().await = Some(child);
        Ok((Box::pin(stdout), Box::pin(stdin)))
    }

    async fn setup_streams(&self) -> TransportResult<()> {
        let (reader, writer): (BoxedReader, BoxedWriter) = {
            let mut source = self.source.lock().await;
            match &mut *source {
                StreamSource::Subprocess => self.spawn_child().await?,
                StreamSource::Raw { reader, writer } => {
                    let reader = reader.take().ok_or_else(|| {
                        TransportError::Configuration("raw reader already consumed".into())
                    })?;
                    let writer = writer.take().ok_or_else(|| {
                        TransportError::Configuration("raw writer already consumed".into())
                    })?;
                    (reader, writer)
                }
            }
        };

        *self.writer.lock().await = Some(FramedWrite::new(writer, LinesCodec::new()));

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        *self.inbound.lock().await = Some(rx);

        let mut lines = FramedRead::new(
            reader,
            LinesCodec::new_with_max_length(self.config.max_message_size),
        );
        let handle = tokio::spawn(async move {
            while let Some(next) = lines.next().await {
                match next {
                    Ok(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        trace!("stdio line in: {} bytes", line.len());
                        match parse_line(line) {
                            Ok(message) => {
                                if tx.send(message).await.is_err() {
                                    debug!("inbound channel closed, stopping stdio reader");
                                    break;
                                }
                            }
                            Err(e) => error!("discarding unparseable stdio line: {e}"),
                        }
                    }
                    // The codec discards the rest of an oversized line, so
                    // the stream stays usable.
                    Err(LinesCodecError::MaxLineLengthExceeded) => {
                        error!("stdio line exceeded maximum length, discarding");
                    }
                    Err(LinesCodecError::Io(e)) => {
                        debug!("stdio read ended: {e}");
                        break;
                    }
                }
            }
            debug!("stdio reader task finished");
        });
        *self.reader_task.lock() = Some(handle);

        Ok(())
    }
}

/// Tag an inbound line with its JSON-RPC `id` when one is present, so logs
/// can correlate; messages without one get a fresh UUID tag.
fn parse_line(line: &str) -> TransportResult<TransportMessage> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let id = value
        .get("id")
        .and_then(|id| match id {
            serde_json::Value::String(s) => Some(MessageId::from(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(MessageId::from),
            _ => None,
        })
        .unwrap_or_else(|| MessageId::from(Uuid::new_v4().to_string()));
    Ok(TransportMessage::new(id, Bytes::from(line.to_string())))
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    async fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    async fn connect(&self) -> TransportResult<()> {
        if self.is_connected().await {
            return Ok(());
        }
        self.set_state(TransportState::Connecting);

        match self.setup_streams().await {
            Ok(()) => {
                self.set_state(TransportState::Connected);
                debug!("Stdio transport connected");
                Ok(())
            }
            Err(e) => {
                self.set_state(TransportState::Failed {
                    reason: e.to_string(),
                });
                error!("Failed to connect stdio transport: {e}");
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if matches!(*self.state.lock(), TransportState::Disconnected) {
            return Ok(());
        }
        self.set_state(TransportState::Disconnecting);

        // Dropping the writer closes the child's stdin, the conventional
        // shutdown signal for a stdio server.
        *self.writer.lock().await = None;

        if let Some(mut child) = self.child.lock().await.take() {
            match timeout(self.config.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => debug!("server process exited: {status}"),
                Ok(Err(e)) => warn!("failed to reap server process: {e}"),
                Err(_) => {
                    warn!(
                        "server process ignored stdin close for {:?}, killing",
                        self.config.shutdown_timeout
                    );
                    if let Err(e) = child.start_kill() {
                        warn!("failed to kill server process: {e}");
                    }
                    let _ = child.wait().await;
                }
            }
        }

        if let Some(handle) = self.reader_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_task.lock().take() {
            handle.abort();
        }
        *self.inbound.lock().await = None;

        self.set_state(TransportState::Disconnected);
        debug!("Stdio transport disconnected");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        {
            let state = self.state.lock();
            if !matches!(*state, TransportState::Connected) {
                return Err(TransportError::NotConnected(state.to_string()));
            }
        }

        let text = message.as_text()?;
        // Line framing cannot carry embedded newlines.
        if text.contains('\n') || text.contains('\r') {
            return Err(TransportError::Protocol(
                "stdio messages must not contain embedded newlines".into(),
            ));
        }
        if text.len() > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: text.len(),
                max: self.config.max_message_size,
            });
        }
        let line = text.to_string();

        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(TransportError::SendFailed("writer not available".into()));
        };
        if let Err(e) = writer.send(line).await {
            error!("Failed to send stdio message: {e}");
            self.set_state(TransportState::Failed {
                reason: e.to_string(),
            });
            return Err(TransportError::SendFailed(e.to_string()));
        }
        trace!("stdio line out: {} bytes", message.size());
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut inbound = self.inbound.lock().await;
        let Some(rx) = inbound.as_mut() else {
            let state = self.state.lock().to_string();
            return Err(TransportError::NotConnected(state));
        };
        match rx.recv().await {
            Some(message) => {
                trace!("stdio message in: {} bytes", message.size());
                Ok(Some(message))
            }
            None => {
                let mut state = self.state.lock();
                if matches!(*state, TransportState::Connected) {
                    warn!("stdio stream closed by peer");
                    *state = TransportState::Failed {
                        reason: "stream closed".into(),
                    };
                }
                Ok(None)
            }
        }
    }

    fn endpoint(&self) -> Option<String> {
        if self.config.command.is_empty() {
            Some("stdio://".to_string())
        } else {
            Some(format!("stdio://{}", self.config.command))
        }
    }
}
