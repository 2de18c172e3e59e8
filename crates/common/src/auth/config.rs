//! OAuth 2.0 service registration
//!
//! Static per-service values: endpoints, client credentials, scope and the two
//! timer constants that drive background refresh.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Grant type used for the initial code exchange unless overridden
pub const DEFAULT_TOKEN_GRANT_TYPE: &str = "authorization_code";

/// Grant type used for every refresh exchange
pub const REFRESH_GRANT_TYPE: &str = "refresh_token";

/// Fixed anti-CSRF `state` value sent with the authorization request
pub const AUTHORIZATION_STATE: &str = "abcdef";

/// How often the background timer checks the token expiry (15 minutes)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15 * 60;

/// How close to expiry a timer tick triggers a refresh (15 minutes)
pub const DEFAULT_EXPIRY_WINDOW_SECS: u64 = 15 * 60;

/// Loopback redirect registered for the desktop client
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:14488/callback";

const INOREADER_AUTHORIZATION_URL: &str = "https://www.inoreader.com/oauth2/auth";
const INOREADER_TOKEN_URL: &str = "https://www.inoreader.com/oauth2/token";
const INOREADER_SCOPE: &str = "read write";

/// Configuration of one OAuth 2.0 protected feed service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Authorization endpoint opened in the browser
    pub authorization_url: String,

    /// Token endpoint receiving code and refresh exchanges
    pub token_url: String,

    /// Redirect URI registered with the provider
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,

    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret (sent in every token request)
    #[serde(default)]
    pub client_secret: String,

    /// Requested scope, space separated
    #[serde(default)]
    pub scope: String,

    /// Grant type for the initial exchange
    #[serde(default = "default_grant_type")]
    pub token_grant_type: String,

    /// Background timer cadence in seconds
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Expiry warning window in seconds
    #[serde(default = "default_expiry_window_secs")]
    pub expiry_window_secs: u64,
}

fn default_redirect_url() -> String {
    DEFAULT_REDIRECT_URL.to_string()
}

fn default_grant_type() -> String {
    DEFAULT_TOKEN_GRANT_TYPE.to_string()
}

const fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

const fn default_expiry_window_secs() -> u64 {
    DEFAULT_EXPIRY_WINDOW_SECS
}

impl OAuthConfig {
    /// Create a configuration with default redirect, grant type and timers
    #[must_use]
    pub fn new(
        authorization_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            authorization_url: authorization_url.into(),
            token_url: token_url.into(),
            redirect_url: default_redirect_url(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
            token_grant_type: default_grant_type(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            expiry_window_secs: DEFAULT_EXPIRY_WINDOW_SECS,
        }
    }

    /// Inoreader endpoints and scope with the given client registration
    #[must_use]
    pub fn inoreader(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::new(
            INOREADER_AUTHORIZATION_URL,
            INOREADER_TOKEN_URL,
            client_id,
            client_secret,
            INOREADER_SCOPE,
        )
    }

    /// Replace the redirect URI
    #[must_use]
    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = redirect_url.into();
        self
    }

    /// Replace both timer constants
    #[must_use]
    pub const fn with_timers(mut self, refresh_interval_secs: u64, expiry_window_secs: u64) -> Self {
        self.refresh_interval_secs = refresh_interval_secs;
        self.expiry_window_secs = expiry_window_secs;
        self
    }

    /// Background timer cadence
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Window before expiry in which a timer tick refreshes the tokens
    #[must_use]
    pub fn expiry_window(&self) -> chrono::Duration {
        let secs = i64::try_from(self.expiry_window_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        chrono::Duration::seconds(secs)
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("authorization_url", &self.authorization_url)
            .field("token_url", &self.token_url)
            .field("redirect_url", &self.redirect_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("scope", &self.scope)
            .field("token_grant_type", &self.token_grant_type)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("expiry_window_secs", &self.expiry_window_secs)
            .finish()
    }
}
