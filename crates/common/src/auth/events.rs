//! Events raised by the token manager
//!
//! Delivered over a `tokio::sync::broadcast` channel; subscribe with
//! [`TokenManager::subscribe`](super::TokenManager::subscribe).

use std::fmt;

use super::types::token_preview;

/// Capacity of the event channel before slow receivers start lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Outcome notifications of the OAuth flow
#[derive(Clone, PartialEq, Eq)]
pub enum OAuthEvent {
    /// A token exchange succeeded and the credentials were stored
    TokensReceived {
        /// New bearer credential
        access_token: String,
        /// New refresh credential
        refresh_token: String,
        /// Access token lifetime in seconds
        expires_in: i64,
    },

    /// The token endpoint answered with an error (or nothing readable)
    TokenError {
        /// OAuth error code
        error: String,
        /// Server supplied description, possibly empty
        error_description: String,
    },

    /// The user rejected consent in the login prompt
    AuthorizationFailed,
}

impl OAuthEvent {
    /// Stable name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TokensReceived { .. } => "tokens_received",
            Self::TokenError { .. } => "token_error",
            Self::AuthorizationFailed => "authorization_failed",
        }
    }
}

impl fmt::Debug for OAuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokensReceived { access_token, refresh_token, expires_in } => f
                .debug_struct("TokensReceived")
                .field("access_token", &token_preview(access_token))
                .field("refresh_token", &token_preview(refresh_token))
                .field("expires_in", expires_in)
                .finish(),
            Self::TokenError { error, error_description } => f
                .debug_struct("TokenError")
                .field("error", error)
                .field("error_description", error_description)
                .finish(),
            Self::AuthorizationFailed => f.write_str("AuthorizationFailed"),
        }
    }
}
