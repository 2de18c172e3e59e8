//! Token manager with background refresh
//!
//! Owns the OAuth 2.0 authorization-code and refresh-token lifecycle for one
//! account:
//! - decides between silent refresh and interactive consent on `login()`
//! - runs token endpoint exchanges on the Tokio runtime
//! - stores credentials atomically on success, logs out on any failure
//! - polls the expiry on a fixed cadence and refreshes ahead of it
//!
//! Nothing here blocks the caller. Results surface as [`OAuthEvent`]s.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::{OAuthConfig, AUTHORIZATION_STATE};
use super::events::{OAuthEvent, EVENT_CHANNEL_CAPACITY};
use super::traits::{
    AuthorizationOutcome, LoginPrompt, Notification, NotificationAction, NotificationSink,
    Severity, TokenEndpoint,
};
use super::types::{token_preview, AuthPhase, TokenExchange, TokenRequest, TokenState};

const LOGIN_TITLE: &str = "Logging in via OAuth 2.0...";

/// Error type for authentication infrastructure
#[derive(Debug, Error)]
pub enum AuthError {
    /// Constructed outside a Tokio runtime
    #[error("Token manager must be created inside a Tokio runtime")]
    NoRuntime,

    /// Keychain operation failed
    #[error("Keychain error: {0}")]
    Keychain(String),

    /// Login prompt could not be shown
    #[error("Login prompt failed: {0}")]
    Prompt(String),
}

struct Session {
    tokens: TokenState,
    phase: AuthPhase,
    // Bumped on logout so results of exchanges started earlier are dropped.
    generation: u64,
    grant_type: String,
}

struct Inner {
    config: OAuthConfig,
    session: Mutex<Session>,
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
    endpoint: Arc<dyn TokenEndpoint>,
    prompt: Arc<dyn LoginPrompt>,
    notifier: Arc<dyn NotificationSink>,
    events: broadcast::Sender<OAuthEvent>,
    runtime: Handle,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// OAuth 2.0 session of one remote account
///
/// Cheap to clone; clones share the same credentials, timer and event
/// channel. Overlapping exchanges are coalesced: while an authorization or
/// refresh is in flight, further `login()` calls and timer ticks do not start
/// another one.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Create a logged-out manager
    ///
    /// # Errors
    /// Returns [`AuthError::NoRuntime`] when called outside a Tokio runtime
    pub fn new(
        config: OAuthConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        prompt: Arc<dyn LoginPrompt>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, AuthError> {
        let runtime = Handle::try_current().map_err(|_| AuthError::NoRuntime)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let session = Session {
            tokens: TokenState::default(),
            phase: AuthPhase::LoggedOut,
            generation: 0,
            grant_type: config.token_grant_type.clone(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                session: Mutex::new(session),
                refresh_timer: Mutex::new(None),
                endpoint,
                prompt,
                notifier,
                events,
                runtime,
            }),
        })
    }

    /// Service registration this manager was built with
    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.inner.config
    }

    /// Receive tokens-received, token-error and authorization-failed events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OAuthEvent> {
        self.inner.events.subscribe()
    }

    /// Current phase of the login state machine
    ///
    /// While an exchange is in flight this is `Authorizing` or `Refreshing`.
    /// Otherwise it follows the credentials as they are now, so token setters
    /// and expiry are reflected without a transition.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        let session = self.inner.session.lock();
        if session.phase.is_exchange_in_flight() {
            session.phase
        } else if session.tokens.is_fully_logged_in() {
            AuthPhase::LoggedIn
        } else {
            AuthPhase::LoggedOut
        }
    }

    /// `Authorization` header value, or `""` when not logged in
    ///
    /// An empty result means "not authenticated yet, retry later". In that
    /// case a critical notification invites the user to log in; activating
    /// it calls [`Self::login`].
    #[must_use]
    pub fn bearer(&self) -> String {
        {
            let session = self.inner.session.lock();
            if session.tokens.is_fully_logged_in() {
                return format!("Bearer {}", session.tokens.access_token);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let action: NotificationAction = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                TokenManager { inner }.login();
            }
        });

        self.inner.notifier.notify(
            Notification::new(
                "You have to log in first",
                "Click here to log in.",
                Severity::Critical,
            )
            .with_action(action),
        );

        String::new()
    }

    /// Both tokens present and not expired
    #[must_use]
    pub fn is_fully_logged_in(&self) -> bool {
        self.inner.session.lock().tokens.is_fully_logged_in()
    }

    /// Entry point of the state machine
    ///
    /// 1. Refresh token present and expiry unknown or passed: start a silent
    ///    refresh, return `false`.
    /// 2. No refresh token: start interactive authorization, return `false`.
    /// 3. Otherwise the session is usable: return `true`.
    pub fn login(&self) -> bool {
        let mut session = self.inner.session.lock();
        let has_refresh_token = session.tokens.has_refresh_token();
        let did_token_expire = session.tokens.is_expired_or_unknown_at(Utc::now());

        if has_refresh_token && !did_token_expire {
            return true;
        }

        if has_refresh_token {
            let Some(generation) = Self::begin_exchange(&mut session, AuthPhase::Refreshing) else {
                return false;
            };
            let refresh_token = session.tokens.refresh_token.clone();
            drop(session);
            self.start_refresh(&refresh_token, generation);
        } else {
            let Some(generation) = Self::begin_exchange(&mut session, AuthPhase::Authorizing)
            else {
                return false;
            };
            drop(session);
            self.start_authorization(generation);
        }

        false
    }

    /// Clear all credentials and stop the refresh timer (idempotent)
    pub fn logout(&self) {
        {
            let mut session = self.inner.session.lock();
            session.tokens.clear();
            session.phase = AuthPhase::LoggedOut;
            session.generation = session.generation.wrapping_add(1);
        }
        self.disarm_refresh_timer();
        debug!("OAuth session logged out");
    }

    /// One background timer tick
    ///
    /// Starts a silent refresh when a refresh token exists and the access
    /// token expires within the configured window (or its expiry is
    /// unknown). Returns whether a refresh was started.
    pub fn poll_refresh(&self) -> bool {
        let mut session = self.inner.session.lock();

        if !session.tokens.has_refresh_token() {
            return false;
        }

        if !session.tokens.expires_within(self.inner.config.expiry_window(), Utc::now()) {
            debug!(
                seconds_until_expiry = ?session.tokens.seconds_until_expiry(),
                "access token is not expiring yet"
            );
            return false;
        }

        let Some(generation) = Self::begin_exchange(&mut session, AuthPhase::Refreshing) else {
            return false;
        };
        let refresh_token = session.tokens.refresh_token.clone();
        drop(session);

        info!("refreshing access token ahead of expiry");
        self.start_refresh(&refresh_token, generation);
        true
    }

    /// Token response handler
    ///
    /// Parses the raw token endpoint body and applies it: an `error` answer
    /// (or an unreadable or token-less body) logs out and raises
    /// [`OAuthEvent::TokenError`]; anything else stores the three credential
    /// fields together, re-arms the timer and raises
    /// [`OAuthEvent::TokensReceived`].
    pub fn handle_token_response(&self, body: &[u8]) {
        self.complete_exchange(TokenExchange::parse(body), None);
    }

    /// Authorization URL handed to the login prompt
    #[must_use]
    pub fn authorization_request_url(&self) -> String {
        let config = &self.inner.config;
        let separator = if config.authorization_url.contains('?') { '&' } else { '?' };

        format!(
            "{}{separator}client_id={}&scope={}&redirect_uri={}&response_type=code&state={}",
            config.authorization_url,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.scope),
            urlencoding::encode(&config.redirect_url),
            AUTHORIZATION_STATE,
        )
    }

    /// Grant type used for the initial code exchange
    #[must_use]
    pub fn token_grant_type(&self) -> String {
        self.inner.session.lock().grant_type.clone()
    }

    /// Change the grant type of the initial code exchange
    pub fn set_token_grant_type(&self, grant_type: impl Into<String>) {
        self.inner.session.lock().grant_type = grant_type.into();
    }

    /// Current access token (possibly empty)
    #[must_use]
    pub fn access_token(&self) -> String {
        self.inner.session.lock().tokens.access_token.clone()
    }

    /// Replace the access token
    pub fn set_access_token(&self, access_token: impl Into<String>) {
        self.inner.session.lock().tokens.access_token = access_token.into();
    }

    /// Current refresh token (possibly empty)
    #[must_use]
    pub fn refresh_token(&self) -> String {
        self.inner.session.lock().tokens.refresh_token.clone()
    }

    /// Replace the refresh token and re-arm the refresh timer
    pub fn set_refresh_token(&self, refresh_token: impl Into<String>) {
        self.inner.session.lock().tokens.refresh_token = refresh_token.into();
        self.rearm_refresh_timer();
    }

    /// Instant the access token expires, if known
    #[must_use]
    pub fn tokens_expire_at(&self) -> Option<DateTime<Utc>> {
        self.inner.session.lock().tokens.expires_at
    }

    /// Replace the expiry instant
    pub fn set_tokens_expire_at(&self, expires_at: Option<DateTime<Utc>>) {
        self.inner.session.lock().tokens.expires_at = expires_at;
    }

    /// Copy of the current credentials
    #[must_use]
    pub fn snapshot(&self) -> TokenState {
        self.inner.session.lock().tokens.clone()
    }

    /// Replace all credentials at once (e.g. loaded from a settings store)
    pub fn restore(&self, tokens: TokenState) {
        {
            let mut session = self.inner.session.lock();
            let logged_in = tokens.is_fully_logged_in();
            session.tokens = tokens;
            if !session.phase.is_exchange_in_flight() {
                session.phase = if logged_in { AuthPhase::LoggedIn } else { AuthPhase::LoggedOut };
            }
        }
        self.rearm_refresh_timer();
    }

    /// Whether the background refresh timer is running
    #[must_use]
    pub fn is_refresh_timer_armed(&self) -> bool {
        self.inner.refresh_timer.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn begin_exchange(session: &mut Session, phase: AuthPhase) -> Option<u64> {
        if session.phase.is_exchange_in_flight() {
            debug!(
                current = %session.phase,
                requested = %phase,
                "token exchange already in flight, coalescing"
            );
            return None;
        }
        session.phase = phase;
        Some(session.generation)
    }

    fn start_refresh(&self, refresh_token: &str, generation: u64) {
        let config = &self.inner.config;

        self.inner.notifier.notify(Notification::new(
            LOGIN_TITLE,
            format!("Refreshing login tokens for '{}'...", config.token_url),
            Severity::Information,
        ));

        debug!(refresh_token = %token_preview(refresh_token), "starting refresh exchange");
        self.spawn_exchange(TokenRequest::refresh(config, refresh_token), generation);
    }

    fn start_authorization(&self, generation: u64) {
        let auth_url = self.authorization_request_url();

        self.inner.notifier.notify(Notification::new(
            LOGIN_TITLE,
            format!("Requesting access authorization for '{}'...", self.inner.config.authorization_url),
            Severity::Information,
        ));

        info!(authorization_url = %self.inner.config.authorization_url, "requesting user consent");

        let manager = self.clone();
        self.inner.runtime.spawn(async move {
            let redirect_url = manager.inner.config.redirect_url.clone();
            let outcome = manager.inner.prompt.authorize(&auth_url, &redirect_url).await;
            manager.handle_authorization(outcome, generation);
        });
    }

    fn handle_authorization(&self, outcome: AuthorizationOutcome, generation: u64) {
        let grant_type = {
            let session = self.inner.session.lock();
            if session.generation != generation {
                debug!("discarding authorization result of a logged-out session");
                return;
            }
            session.grant_type.clone()
        };

        match outcome {
            AuthorizationOutcome::Granted(code) => {
                info!("authorization code obtained, exchanging for tokens");
                let request =
                    TokenRequest::authorization_code(&self.inner.config, &grant_type, &code);
                self.spawn_exchange(request, generation);
            }
            AuthorizationOutcome::Rejected => {
                warn!("user rejected OAuth authorization");
                self.logout();
                self.emit(OAuthEvent::AuthorizationFailed);
            }
        }
    }

    fn spawn_exchange(&self, request: TokenRequest, generation: u64) {
        let manager = self.clone();
        self.inner.runtime.spawn(async move {
            let exchange = match manager.inner.endpoint.post_form(&request).await {
                Ok(body) => TokenExchange::parse(&body),
                Err(err) => {
                    warn!(error = %err, grant = ?request.kind(), "token request failed");
                    TokenExchange::malformed()
                }
            };
            manager.complete_exchange(exchange, Some(generation));
        });
    }

    fn complete_exchange(&self, exchange: TokenExchange, generation: Option<u64>) {
        let mut session = self.inner.session.lock();
        if generation.is_some_and(|generation| generation != session.generation) {
            debug!("discarding token response of a logged-out session");
            return;
        }

        match exchange {
            TokenExchange::Failed { error, error_description } => {
                drop(session);
                warn!(%error, %error_description, "token endpoint returned an error");
                self.logout();
                self.emit(OAuthEvent::TokenError { error, error_description });
            }
            TokenExchange::Granted { access_token, refresh_token, expires_in } => {
                let now = Utc::now();
                let expires_at = chrono::Duration::try_seconds(expires_in)
                    .and_then(|lifetime| now.checked_add_signed(lifetime));

                session.tokens =
                    TokenState::new(access_token.clone(), refresh_token.clone(), expires_at);
                session.phase = if session.tokens.is_fully_logged_in_at(now) {
                    AuthPhase::LoggedIn
                } else {
                    AuthPhase::LoggedOut
                };
                drop(session);

                info!(
                    refresh_token = %token_preview(&refresh_token),
                    expires_in,
                    expires_at = ?expires_at,
                    "obtained OAuth tokens"
                );

                self.rearm_refresh_timer();
                self.emit(OAuthEvent::TokensReceived { access_token, refresh_token, expires_in });
            }
        }
    }

    fn emit(&self, event: OAuthEvent) {
        let name = event.name();
        if self.inner.events.send(event).is_err() {
            debug!(event = name, "no subscribers for OAuth event");
        }
    }

    fn rearm_refresh_timer(&self) {
        let mut timer = self.inner.refresh_timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        if !self.inner.session.lock().tokens.has_refresh_token() {
            return;
        }

        let period = self.inner.config.refresh_interval();
        if period.is_zero() {
            warn!("refresh interval is zero, background refresh disabled");
            return;
        }

        let inner = Arc::downgrade(&self.inner);
        *timer = Some(self.inner.runtime.spawn(refresh_loop(inner, period)));
    }

    fn disarm_refresh_timer(&self) {
        if let Some(handle) = self.inner.refresh_timer.lock().take() {
            handle.abort();
        }
    }
}

async fn refresh_loop(inner: Weak<Inner>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        TokenManager { inner }.poll_refresh();
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.session.lock();
        f.debug_struct("TokenManager")
            .field("token_url", &self.inner.config.token_url)
            .field("phase", &session.phase)
            .field("tokens", &session.tokens)
            .finish_non_exhaustive()
    }
}
