//! Connection registry.
//!
//! [`McpClient`] owns two maps: server name to configuration and server
//! name to live session. Configurations come from the `mcpServers` JSON
//! shape or programmatic registration; sessions are created explicitly and
//! replaced wholesale on reconnect. Per-server isolation holds throughout:
//! one server's failure never touches another's session.

use std::path::Path;

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ServerConfig};
use crate::error::{ClientError, ClientResult};
use crate::session::Session;

/// Registry of configured servers and their live sessions.
///
/// All methods take `&self`; the registry is usually shared behind an
/// `Arc` between whatever owns the configuration and the tasks driving
/// individual sessions.
#[derive(Debug, Default)]
pub struct McpClient {
    configs: DashMap<String, ServerConfig>,
    sessions: DashMap<String, Session>,
}

impl McpClient {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from a parsed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when a server name is invalid.
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let client = Self::new();
        for (name, server) in config.mcp_servers {
            client.add_server(&name, server)?;
        }
        Ok(client)
    }

    /// Registry seeded from an in-memory `mcpServers` JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Serialization`] when the value does not parse
    /// and [`ClientError::Config`] when a server name is invalid.
    pub fn from_value(value: Value) -> ClientResult<Self> {
        Self::from_config(ClientConfig::from_value(value)?)
    }

    /// Registry seeded from a JSON configuration file.
    ///
    /// # Errors
    ///
    /// As [`McpClient::from_value`], plus [`ClientError::Config`] when the
    /// file cannot be read.
    pub fn from_config_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        Self::from_config(ClientConfig::from_file(path)?)
    }

    /// Register or replace the configuration for `name`.
    ///
    /// Replacing a configuration does not touch a live session; the change
    /// applies on the next [`McpClient::create_session`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when `name` is empty or contains
    /// `'.'`, which is reserved as the server/tool separator in qualified
    /// tool names.
    pub fn add_server(&self, name: &str, config: ServerConfig) -> ClientResult<()> {
        if name.is_empty() {
            return Err(ClientError::Config(
                "server name must not be empty".to_string(),
            ));
        }
        if name.contains('.') {
            return Err(ClientError::Config(format!(
                "server name '{name}' must not contain '.'"
            )));
        }
        if self.configs.insert(name.to_string(), config).is_some() {
            debug!(server = name, "server configuration replaced");
        }
        Ok(())
    }

    /// Drop the configuration for `name` and close its session, if any.
    ///
    /// Idempotent; teardown errors are logged, not returned.
    pub async fn remove_server(&self, name: &str) {
        self.configs.remove(name);
        if let Some((_, session)) = self.sessions.remove(name) {
            if let Err(e) = session.disconnect().await {
                warn!(server = name, "session teardown during removal: {e}");
            }
        }
    }

    /// All configured server names, sorted.
    pub fn get_server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Configuration for `name`, if registered.
    pub fn get_server_config(&self, name: &str) -> Option<ServerConfig> {
        self.configs.get(name).map(|e| e.value().clone())
    }

    /// Create (or recreate) the session for `name` and connect it.
    ///
    /// An existing session is closed and replaced; sessions are never
    /// reused across reconnects. The new session is registered before the
    /// connection attempt, so a session parked in `pending_auth` or
    /// `failed` remains reachable through [`McpClient::get_session`] for
    /// the auth overlay or inspection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownServer`] for an unregistered name,
    /// [`ClientError::AuthRequired`] when the server demands authorization,
    /// or any connect/handshake error.
    pub async fn create_session(&self, name: &str, auto_initialize: bool) -> ClientResult<Session> {
        let config = self
            .configs
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| ClientError::UnknownServer(name.to_string()))?;

        if let Some((_, old)) = self.sessions.remove(name) {
            debug!(server = name, "replacing existing session");
            if let Err(e) = old.disconnect().await {
                warn!(server = name, "previous session teardown: {e}");
            }
        }

        let session = Session::new(name, config)?;
        self.sessions.insert(name.to_string(), session.clone());

        session.connect().await?;
        if auto_initialize {
            session.initialize().await?;
        }
        Ok(session)
    }

    /// Create sessions for every configured server, concurrently.
    ///
    /// One server's failure never aborts the others. Returns the failures;
    /// an empty vector means every server came up.
    pub async fn create_all_sessions(&self, auto_initialize: bool) -> Vec<(String, ClientError)> {
        let attempts = self.get_server_names().into_iter().map(|name| async move {
            let outcome = self.create_session(&name, auto_initialize).await;
            (name, outcome)
        });

        let mut failures = Vec::new();
        for (name, outcome) in join_all(attempts).await {
            if let Err(e) = outcome {
                warn!(server = %name, "session creation failed: {e}");
                failures.push((name, e));
            }
        }
        failures
    }

    /// Live session for `name`, if one exists in any state.
    pub fn get_session(&self, name: &str) -> Option<Session> {
        self.sessions.get(name).map(|e| e.value().clone())
    }

    /// Every live session, sorted by server name.
    pub fn active_sessions(&self) -> Vec<(String, Session)> {
        let mut sessions: Vec<(String, Session)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        sessions
    }

    /// Live session for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownSession`] when no session exists.
    pub fn require_session(&self, name: &str) -> ClientResult<Session> {
        self.get_session(name)
            .ok_or_else(|| ClientError::UnknownSession(name.to_string()))
    }

    /// Close and deregister the session for `name`.
    ///
    /// Unknown names are a no-op. The registry entry is removed before
    /// teardown, so the session is gone even when closing errors.
    ///
    /// # Errors
    ///
    /// Returns the session's teardown error, if any.
    pub async fn close_session(&self, name: &str) -> ClientResult<()> {
        match self.sessions.remove(name) {
            Some((_, session)) => session.disconnect().await,
            None => Ok(()),
        }
    }

    /// Close every session, continuing past failures.
    ///
    /// Individual teardown errors are logged and aggregated, never thrown;
    /// afterwards the registry holds no sessions regardless of the outcome.
    pub async fn close_all_sessions(&self) -> Vec<(String, ClientError)> {
        let mut names: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        names.sort();

        let mut failures = Vec::new();
        for name in names {
            if let Err(e) = self.close_session(&name).await {
                warn!(server = %name, "session close failed: {e}");
                failures.push((name, e));
            }
        }
        debug!(failed = failures.len(), "all sessions closed");
        failures
    }
}

#[cfg(test)]
impl McpClient {
    /// Install a session directly, bypassing configuration and connect.
    pub(crate) fn seed_session(&self, name: &str, session: Session) {
        self.sessions.insert(name.to_string(), session);
    }
}
