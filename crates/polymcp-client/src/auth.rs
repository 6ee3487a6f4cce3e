//! OAuth overlay for servers that demand interactive authorization.
//!
//! When a connect or handshake ends in [`ClientError::AuthRequired`], the
//! session parks in `pending_auth` and an [`OauthOverlay`] takes over: it
//! builds the authorization URL, hands it to a host-supplied
//! [`AuthorizationHandler`] for the interactive step, exchanges the returned
//! code for a bearer token, and resumes the session over a rebuilt transport
//! carrying the credentials. A configured proxy URL gives the overlay one
//! fallback mode when the direct endpoint refuses the authorized connection.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{self, OauthConfig, ServerConfig, TransportSpec};
use crate::error::{ClientError, ClientResult};
use crate::session::{Session, SessionState};

/// Host-supplied hook that drives the interactive part of the flow.
///
/// Given the authorization URL, the implementation gets a user through the
/// consent screen (open a browser, run a local redirect listener, poll a
/// device) and returns the authorization code from the callback.
#[async_trait]
pub trait AuthorizationHandler: Send + Sync {
    /// Obtain an authorization code for `url`.
    async fn authorize(&self, url: &str) -> ClientResult<String>;
}

/// How the overlay reaches the server once credentials are in hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthConnectionType {
    /// Straight to the configured endpoint
    Direct,
    /// Through the configured proxy URL
    ViaProxy,
}

impl fmt::Display for AuthConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Direct => "direct",
            Self::ViaProxy => "via_proxy",
        })
    }
}

/// Point-in-time view of an authorization attempt, cheap enough to poll
/// from a UI.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    /// Owning session's lifecycle state
    pub state: SessionState,
    /// Mode the current (or next) attempt connects through
    pub connection_type: AuthConnectionType,
    /// Authorization URL handed to the handler, once built
    pub auth_url: Option<String>,
    /// Most recent failure, if any
    pub error: Option<String>,
    /// Both connection modes have been attempted
    pub has_tried_both_modes: bool,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Interactive-authorization state machine layered on one [`Session`].
///
/// The overlay owns the retry policy the session itself refuses to have: a
/// failed authorized connect may flip to the proxy mode once, and
/// [`OauthOverlay::retry`] replaces a dead session with a fresh one built
/// from the same configuration.
pub struct OauthOverlay {
    /// Replaced wholesale by [`OauthOverlay::retry`]; sessions are never
    /// resurrected.
    session: Mutex<Session>,
    oauth: OauthConfig,
    handler: Arc<dyn AuthorizationHandler>,
    http: reqwest::Client,
    connection_type: Mutex<AuthConnectionType>,
    tried_both_modes: AtomicBool,
    auth_url: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
    token: Mutex<Option<String>>,
}

impl fmt::Debug for OauthOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session.lock().clone();
        f.debug_struct("OauthOverlay")
            .field("server", &session.name())
            .field("state", &session.state())
            .field("connection_type", &*self.connection_type.lock())
            .finish_non_exhaustive()
    }
}

impl OauthOverlay {
    /// Overlay for `session`, which must be configured with an
    /// [`OauthConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the session's configuration has
    /// no `oauth` block.
    pub fn new(session: Session, handler: Arc<dyn AuthorizationHandler>) -> ClientResult<Self> {
        let oauth = session
            .config()
            .auth
            .as_ref()
            .and_then(|auth| auth.oauth.clone())
            .ok_or_else(|| {
                ClientError::Config(format!(
                    "server '{}' has no oauth configuration",
                    session.name()
                ))
            })?;
        Ok(Self {
            session: Mutex::new(session),
            oauth,
            handler,
            http: reqwest::Client::new(),
            connection_type: Mutex::new(AuthConnectionType::Direct),
            tried_both_modes: AtomicBool::new(false),
            auth_url: Mutex::new(None),
            last_error: Mutex::new(None),
            token: Mutex::new(None),
        })
    }

    /// Handle to the session the overlay currently manages. After a
    /// successful [`OauthOverlay::retry`] this may be a different session
    /// than the one the overlay was built with.
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    /// Current view of the attempt for display or polling.
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            state: self.session.lock().state(),
            connection_type: *self.connection_type.lock(),
            auth_url: self.auth_url.lock().clone(),
            error: self.last_error.lock().clone(),
            has_tried_both_modes: self.tried_both_modes.load(Ordering::Relaxed),
        }
    }

    /// Run the authorization flow and bring the session to `ready`.
    ///
    /// Only legal while the session is `pending_auth`. On failure the
    /// session is `failed` and the error is also recorded in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidTransition`] from any other state,
    /// [`ClientError::AuthDenied`] when the handler or token endpoint
    /// refuses, or the connect/handshake error of the resumed session.
    pub async fn authenticate(&self) -> ClientResult<()> {
        let session = self.session();
        session.begin_authentication()?;
        match self.run_flow(&session).await {
            Ok(()) => {
                *self.last_error.lock() = None;
                Ok(())
            }
            Err(e) => {
                *self.last_error.lock() = Some(e.to_string());
                session.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Re-attempt a connection with current credentials.
    ///
    /// From `pending_auth` this is [`OauthOverlay::authenticate`]. From
    /// `failed` or `closed` it builds a replacement session over a fresh
    /// transport; a rejected cached token is dropped and the interactive
    /// flow runs again.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidTransition`] when the session is in
    /// any state other than `pending_auth`, `failed`, or `closed`;
    /// otherwise as [`OauthOverlay::authenticate`].
    pub async fn retry(&self) -> ClientResult<()> {
        let session = self.session();
        match session.state() {
            SessionState::PendingAuth => self.authenticate().await,
            SessionState::Failed | SessionState::Closed => {
                self.retry_with_fresh_session(&session).await
            }
            state => Err(ClientError::InvalidTransition {
                from: state,
                to: SessionState::Connecting,
            }),
        }
    }

    async fn run_flow(&self, session: &Session) -> ClientResult<()> {
        let cached = self.token.lock().clone();
        let token = match cached {
            Some(token) => token,
            None => {
                let token = self.authorize_interactively().await?;
                *self.token.lock() = Some(token.clone());
                token
            }
        };
        self.resume(session, &token).await
    }

    async fn authorize_interactively(&self) -> ClientResult<String> {
        let url = self.build_authorization_url()?;
        *self.auth_url.lock() = Some(url.clone());
        info!(url = %url, "waiting for interactive authorization");
        let code = self.handler.authorize(&url).await?;
        self.exchange_code(&code).await
    }

    fn build_authorization_url(&self) -> ClientResult<String> {
        let mut url = Url::parse(&self.oauth.authorization_endpoint)
            .map_err(|e| ClientError::Config(format!("invalid authorization endpoint: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.oauth.client_id)
                .append_pair("redirect_uri", &self.oauth.redirect_uri)
                .append_pair("state", &Uuid::new_v4().to_string());
            if !self.oauth.scopes.is_empty() {
                pairs.append_pair("scope", &self.oauth.scopes.join(" "));
            }
        }
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> ClientResult<String> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
            ("client_id", self.oauth.client_id.as_str()),
        ];
        if let Some(secret) = &self.oauth.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(&self.oauth.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::AuthDenied(format!("token exchange failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::AuthDenied(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::AuthDenied(format!("malformed token response: {e}")))?;
        debug!("token exchange complete");
        Ok(token.access_token)
    }

    /// Resume the session with credentials, falling back to the proxy mode
    /// once when the direct endpoint refuses.
    async fn resume(&self, session: &Session, token: &str) -> ClientResult<()> {
        match self.resume_once(session, token).await {
            Ok(()) => Ok(()),
            Err(first) => {
                if !self.flip_mode_for_retry() {
                    return Err(first);
                }
                warn!(
                    server = %session.name(),
                    "authorized connection failed, retrying via proxy: {first}"
                );
                self.resume_once(session, token).await
            }
        }
    }

    async fn resume_once(&self, session: &Session, token: &str) -> ClientResult<()> {
        let config = self.endpoint_config(session);
        let transport = config::build_transport_with_token(&config, Some(token.to_string()))?;
        session.resume_with_transport(transport).await
    }

    /// Flip `direct -> via_proxy` for one more attempt. `false` when no
    /// proxy is configured or both modes are already spent.
    fn flip_mode_for_retry(&self) -> bool {
        if self.oauth.proxy_url.is_none() {
            return false;
        }
        let mut mode = self.connection_type.lock();
        if *mode != AuthConnectionType::Direct || self.tried_both_modes.load(Ordering::Relaxed) {
            return false;
        }
        *mode = AuthConnectionType::ViaProxy;
        self.tried_both_modes.store(true, Ordering::Relaxed);
        true
    }

    /// Configuration with the endpoint the current mode connects to. The
    /// proxy mode swaps the URL; stdio has nothing to swap.
    fn endpoint_config(&self, session: &Session) -> ServerConfig {
        let mut config = session.config().clone();
        if *self.connection_type.lock() == AuthConnectionType::ViaProxy {
            if let Some(proxy) = &self.oauth.proxy_url {
                match &mut config.transport {
                    TransportSpec::Http { url, .. }
                    | TransportSpec::StreamableHttp { url, .. }
                    | TransportSpec::WebSocket { url, .. } => *url = proxy.clone(),
                    TransportSpec::Stdio { .. } => {}
                }
            }
        }
        config
    }

    async fn retry_with_fresh_session(&self, old: &Session) -> ClientResult<()> {
        let token = self.token.lock().clone();
        let config = self.endpoint_config(old);
        let transport = config::build_transport_with_token(&config, token)?;
        let fresh = Session::with_transport(
            old.name().to_string(),
            old.config().clone(),
            old.options().clone(),
            transport,
        );
        *self.session.lock() = fresh.clone();

        match fresh.connect().await {
            Ok(()) => {}
            Err(ClientError::AuthRequired(_)) => {
                // Cached token rejected before the handshake; run the
                // interactive flow again from scratch.
                *self.token.lock() = None;
                return self.authenticate().await;
            }
            Err(e) => {
                *self.last_error.lock() = Some(e.to_string());
                return Err(e);
            }
        }
        match fresh.initialize().await {
            Ok(()) => {
                *self.last_error.lock() = None;
                info!(server = %fresh.name(), "session ready after retry");
                Ok(())
            }
            Err(ClientError::AuthRequired(_)) => {
                *self.token.lock() = None;
                self.authenticate().await
            }
            Err(e) => {
                *self.last_error.lock() = Some(e.to_string());
                Err(e)
            }
        }
    }
}
