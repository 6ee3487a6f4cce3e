//! Incremental Server-Sent Events decoding.
//!
//! Events are fields separated by newlines and terminated by a blank line:
//!
//! ```text
//! id: event-123
//! event: message
//! data: {"jsonrpc": "2.0", ...}
//!
//! ```

/// One decoded Server-Sent Event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event ID, echoed back as `Last-Event-ID` on reconnect
    pub id: Option<String>,
    /// Event type; clients treat a missing type as "message"
    pub event: Option<String>,
    /// Event data, joined with newlines when split across `data:` lines
    pub data: String,
    /// Server-suggested reconnect interval in milliseconds
    pub retry: Option<u64>,
}

impl SseEvent {
    /// `true` for events the transport forwards as JSON-RPC payloads.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Streaming SSE parser; feed it byte chunks as they arrive.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current_id: Option<String>,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_retry: Option<u64>,
}

impl SseParser {
    /// Empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return any events completed by it.
    ///
    /// Chunk boundaries need not align with lines or events; partial input
    /// is buffered until the terminating blank line arrives. Non-UTF-8
    /// chunks are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(s) => self.buffer.push_str(s),
            Err(_) => return Vec::new(),
        }

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.finish_event() {
                    events.push(event);
                }
            } else if line.starts_with(':') {
                // Comment, typically a keepalive.
            } else if let Some(colon_pos) = line.find(':') {
                let field = &line[..colon_pos];
                let value = line[colon_pos + 1..].trim_start();
                match field {
                    "id" => self.current_id = Some(value.to_string()),
                    "event" => self.current_event = Some(value.to_string()),
                    "data" => self.current_data.push(value.to_string()),
                    "retry" => {
                        if let Ok(ms) = value.parse() {
                            self.current_retry = Some(ms);
                        }
                    }
                    _ => {}
                }
            } else {
                // A bare field name carries an empty value.
                match line {
                    "id" => self.current_id = Some(String::new()),
                    "event" => self.current_event = Some(String::new()),
                    "data" => self.current_data.push(String::new()),
                    _ => {}
                }
            }
        }

        events
    }

    fn finish_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            self.current_id = None;
            self.current_event = None;
            self.current_retry = None;
            return None;
        }

        Some(SseEvent {
            id: self.current_id.take(),
            event: self.current_event.take(),
            data: std::mem::take(&mut self.current_data).join("\n"),
            retry: self.current_retry.take(),
        })
    }
}
