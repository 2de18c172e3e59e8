//! OAuth 2.0 session types
//!
//! Defines the credential state owned by the token manager, the phases of the
//! login state machine, the token endpoint request form and the lenient parser
//! for token endpoint responses.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::{OAuthConfig, REFRESH_GRANT_TYPE};

/// Error code reported when the token endpoint answer cannot be understood
pub const MALFORMED_RESPONSE_ERROR: &str = "malformed_response";

/// Content type of every token endpoint request
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Credentials of one logged-in account
///
/// Empty strings mean "absent"; `expires_at == None` means the expiry is
/// unknown. All three fields are replaced together on a successful exchange
/// and cleared together on logout.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    /// Short-lived bearer credential
    pub access_token: String,

    /// Long-lived credential used for silent refresh
    pub refresh_token: String,

    /// Absolute instant after which `access_token` is invalid
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// Build a state from raw parts
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Both tokens present and the expiry lies after `now`
    #[must_use]
    pub fn is_fully_logged_in_at(&self, now: DateTime<Utc>) -> bool {
        let is_expiration_valid = self.expires_at.is_some_and(|expires_at| expires_at > now);
        let do_tokens_exist = !self.access_token.is_empty() && !self.refresh_token.is_empty();

        is_expiration_valid && do_tokens_exist
    }

    /// [`Self::is_fully_logged_in_at`] evaluated against the current time
    #[must_use]
    pub fn is_fully_logged_in(&self) -> bool {
        self.is_fully_logged_in_at(Utc::now())
    }

    /// Expiry unknown or already passed
    #[must_use]
    pub fn is_expired_or_unknown_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at < now)
    }

    /// Expiry unknown or closer than `window` to `now`
    #[must_use]
    pub fn expires_within(&self, window: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| {
            expires_at.checked_sub_signed(window).map_or(true, |threshold| threshold < now)
        })
    }

    /// A refresh token is available
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Seconds until the access token expires, if the expiry is known
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }

    /// Reset every credential field
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &token_preview(&self.access_token))
            .field("refresh_token", &token_preview(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Short, log-safe rendering of a credential
pub(crate) fn token_preview(token: &str) -> String {
    if token.is_empty() {
        return "<empty>".to_string();
    }
    let head: String = token.chars().take(4).collect();
    format!("{head}… ({} chars)", token.chars().count())
}

/// Phase of the login state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthPhase {
    /// No usable credentials and nothing in flight
    #[default]
    LoggedOut,

    /// Interactive consent or the following code exchange is in flight
    Authorizing,

    /// Silent refresh exchange is in flight
    Refreshing,

    /// Credentials were obtained by the last exchange
    LoggedIn,
}

impl AuthPhase {
    /// An exchange is outstanding
    #[must_use]
    pub const fn is_exchange_in_flight(self) -> bool {
        matches!(self, Self::Authorizing | Self::Refreshing)
    }

    /// Stable name for logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::Authorizing => "authorizing",
            Self::Refreshing => "refreshing",
            Self::LoggedIn => "logged_in",
        }
    }
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which grant a token request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    /// Code obtained from the interactive prompt
    AuthorizationCode,
    /// Stored refresh token
    Refresh,
}

/// Form-encoded POST to the token endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
    url: String,
    kind: GrantKind,
    form: Vec<(&'static str, String)>,
}

impl TokenRequest {
    /// Exchange an authorization code using the configured grant type
    #[must_use]
    pub fn authorization_code(config: &OAuthConfig, grant_type: &str, code: &str) -> Self {
        Self {
            url: config.token_url.clone(),
            kind: GrantKind::AuthorizationCode,
            form: vec![
                ("client_id", config.client_id.clone()),
                ("client_secret", config.client_secret.clone()),
                ("code", code.to_string()),
                ("redirect_uri", config.redirect_url.clone()),
                ("grant_type", grant_type.to_string()),
            ],
        }
    }

    /// Exchange a refresh token; the grant type is always `refresh_token`
    #[must_use]
    pub fn refresh(config: &OAuthConfig, refresh_token: &str) -> Self {
        Self {
            url: config.token_url.clone(),
            kind: GrantKind::Refresh,
            form: vec![
                ("client_id", config.client_id.clone()),
                ("client_secret", config.client_secret.clone()),
                ("refresh_token", refresh_token.to_string()),
                ("grant_type", REFRESH_GRANT_TYPE.to_string()),
            ],
        }
    }

    /// Token endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Grant carried by this request
    #[must_use]
    pub const fn kind(&self) -> GrantKind {
        self.kind
    }

    /// Form fields in wire order
    #[must_use]
    pub fn form(&self) -> &[(&'static str, String)] {
        &self.form
    }

    /// Value of one form field
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.form.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    /// `application/x-www-form-urlencoded` body
    #[must_use]
    pub fn encoded_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new()).extend_pairs(self.form.iter()).finish()
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.form.iter().map(|(k, _)| *k).collect();
        f.debug_struct("TokenRequest")
            .field("url", &self.url)
            .field("kind", &self.kind)
            .field("fields", &keys)
            .finish()
    }
}

/// Outcome of one token endpoint exchange
#[derive(Clone, PartialEq, Eq)]
pub enum TokenExchange {
    /// The endpoint issued tokens
    Granted {
        /// New bearer credential
        access_token: String,
        /// New refresh credential
        refresh_token: String,
        /// Lifetime of the access token in seconds
        expires_in: i64,
    },

    /// The endpoint refused, or answered with something unreadable
    Failed {
        /// OAuth error code
        error: String,
        /// Human readable description
        error_description: String,
    },
}

impl TokenExchange {
    /// Interpret a raw token endpoint body
    ///
    /// A body that is not a JSON object, or an object carrying neither
    /// `error` nor any token field, is reported as
    /// [`MALFORMED_RESPONSE_ERROR`] with an empty description. Otherwise
    /// missing or mistyped fields fall back to `""` and `0`.
    #[must_use]
    pub fn parse(body: &[u8]) -> Self {
        let Ok(Value::Object(root)) = serde_json::from_slice::<Value>(body) else {
            return Self::malformed();
        };

        if root.contains_key("error") {
            return Self::Failed {
                error: string_field(&root, "error"),
                error_description: string_field(&root, "error_description"),
            };
        }

        if !root.contains_key("access_token") && !root.contains_key("refresh_token") {
            return Self::malformed();
        }

        Self::Granted {
            access_token: string_field(&root, "access_token"),
            refresh_token: string_field(&root, "refresh_token"),
            expires_in: integer_field(&root, "expires_in"),
        }
    }

    /// Failure used for unreadable bodies and transport errors
    #[must_use]
    pub fn malformed() -> Self {
        Self::Failed { error: MALFORMED_RESPONSE_ERROR.to_string(), error_description: String::new() }
    }
}

impl fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted { access_token, refresh_token, expires_in } => f
                .debug_struct("Granted")
                .field("access_token", &token_preview(access_token))
                .field("refresh_token", &token_preview(refresh_token))
                .field("expires_in", expires_in)
                .finish(),
            Self::Failed { error, error_description } => f
                .debug_struct("Failed")
                .field("error", error)
                .field("error_description", error_description)
                .finish(),
        }
    }
}

fn string_field(root: &Map<String, Value>, key: &str) -> String {
    root.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

// Whole numbers only; fractional and non-numeric values read as zero.
#[allow(clippy::cast_possible_truncation)]
fn integer_field(root: &Map<String, Value>, key: &str) -> i64 {
    match root.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map_or(0, |f| f as i64)
        }),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::types.
    use super::*;

    fn config() -> OAuthConfig {
        OAuthConfig::new(
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
            "client-1",
            "s3cret",
            "read write",
        )
        .with_redirect_url("http://localhost:9000/cb")
    }

    #[test]
    fn test_fully_logged_in_requires_all_fields() {
        let now = Utc::now();
        let later = Some(now + chrono::Duration::hours(1));

        assert!(TokenState::new("a", "r", later).is_fully_logged_in_at(now));
        assert!(!TokenState::new("", "r", later).is_fully_logged_in_at(now));
        assert!(!TokenState::new("a", "", later).is_fully_logged_in_at(now));
        assert!(!TokenState::new("a", "r", None).is_fully_logged_in_at(now));
        assert!(!TokenState::new("a", "r", Some(now - chrono::Duration::seconds(1)))
            .is_fully_logged_in_at(now));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut state = TokenState::new("a", "r", Some(Utc::now()));
        state.clear();

        assert_eq!(state, TokenState::default());
        assert!(!state.is_fully_logged_in());
    }

    #[test]
    fn test_expires_within_window() {
        let now = Utc::now();
        let window = chrono::Duration::minutes(15);

        let soon = TokenState::new("a", "r", Some(now + chrono::Duration::minutes(10)));
        let later = TokenState::new("a", "r", Some(now + chrono::Duration::minutes(30)));

        assert!(soon.expires_within(window, now));
        assert!(!later.expires_within(window, now));
        assert!(TokenState::default().expires_within(window, now));
    }

    #[test]
    fn test_debug_does_not_leak_tokens() {
        let state = TokenState::new("access-token-value", "refresh-token-value", None);
        let rendered = format!("{state:?}");

        assert!(!rendered.contains("access-token-value"));
        assert!(!rendered.contains("refresh-token-value"));
    }

    #[test]
    fn test_authorization_code_form() {
        let request = TokenRequest::authorization_code(&config(), "authorization_code", "xyz");
        let keys: Vec<&str> = request.form().iter().map(|(k, _)| *k).collect();

        assert_eq!(request.url(), "https://auth.example.com/token");
        assert_eq!(request.kind(), GrantKind::AuthorizationCode);
        assert_eq!(keys, ["client_id", "client_secret", "code", "redirect_uri", "grant_type"]);
        assert_eq!(request.param("redirect_uri"), Some("http://localhost:9000/cb"));
        assert_eq!(request.param("grant_type"), Some("authorization_code"));
    }

    #[test]
    fn test_refresh_form_ignores_configured_grant_type() {
        let mut config = config();
        config.token_grant_type = "password".to_string();

        let request = TokenRequest::refresh(&config, "rt");

        assert_eq!(request.kind(), GrantKind::Refresh);
        assert_eq!(request.param("grant_type"), Some("refresh_token"));
        assert_eq!(request.param("refresh_token"), Some("rt"));
        assert_eq!(request.param("code"), None);
    }

    #[test]
    fn test_encoded_body_escapes_values() {
        let request = TokenRequest::refresh(&config(), "a b&c");
        let body = request.encoded_body();

        assert!(body.starts_with("client_id=client-1&client_secret=s3cret&"));
        assert!(body.contains("refresh_token=a+b%26c"));
        assert!(body.ends_with("grant_type=refresh_token"));
    }

    #[test]
    fn test_parse_granted() {
        let exchange =
            TokenExchange::parse(br#"{"access_token":"A","refresh_token":"R","expires_in":3600}"#);

        assert_eq!(
            exchange,
            TokenExchange::Granted {
                access_token: "A".into(),
                refresh_token: "R".into(),
                expires_in: 3600
            }
        );
    }

    #[test]
    fn test_parse_error_with_and_without_description() {
        let full = TokenExchange::parse(br#"{"error":"invalid_grant","error_description":"expired"}"#);
        let bare = TokenExchange::parse(br#"{"error":"invalid_client"}"#);

        assert_eq!(
            full,
            TokenExchange::Failed { error: "invalid_grant".into(), error_description: "expired".into() }
        );
        assert_eq!(
            bare,
            TokenExchange::Failed { error: "invalid_client".into(), error_description: String::new() }
        );
    }

    #[test]
    fn test_parse_lenient_fields() {
        let exchange = TokenExchange::parse(br#"{"access_token":7,"expires_in":"soon"}"#);

        assert_eq!(
            exchange,
            TokenExchange::Granted {
                access_token: String::new(),
                refresh_token: String::new(),
                expires_in: 0
            }
        );
        assert!(matches!(
            TokenExchange::parse(br#"{"refresh_token":"R","expires_in":1800.0}"#),
            TokenExchange::Granted { expires_in: 1800, .. }
        ));
    }

    #[test]
    fn test_parse_object_without_tokens_is_malformed() {
        assert_eq!(TokenExchange::parse(b"{}"), TokenExchange::malformed());
        assert_eq!(
            TokenExchange::parse(br#"{"message":"upstream unavailable","expires_in":3600}"#),
            TokenExchange::malformed()
        );
    }

    #[test]
    fn test_parse_unreadable_body_is_malformed() {
        assert_eq!(TokenExchange::parse(b"<html>bad gateway</html>"), TokenExchange::malformed());
        assert_eq!(TokenExchange::parse(b"[1,2,3]"), TokenExchange::malformed());
        assert_eq!(TokenExchange::parse(b""), TokenExchange::malformed());
    }

    #[test]
    fn test_phase_flags() {
        assert!(AuthPhase::Authorizing.is_exchange_in_flight());
        assert!(AuthPhase::Refreshing.is_exchange_in_flight());
        assert!(!AuthPhase::LoggedIn.is_exchange_in_flight());
        assert_eq!(AuthPhase::default(), AuthPhase::LoggedOut);
        assert_eq!(AuthPhase::Refreshing.to_string(), "refreshing");
    }
}
