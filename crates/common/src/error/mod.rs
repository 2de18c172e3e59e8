//! Error types used throughout the crate
//!
//! Module-specific errors live next to the code that raises them
//! ([`AuthError`], [`TokenEndpointError`], [`ConfigError`]) and compose into
//! [`FeedwireError`] for callers that only want one type to propagate.
//!
//! Note that failures *inside* the OAuth flow (rejected consent, token
//! endpoint errors, malformed responses) are never surfaced as `Err`: the
//! token manager absorbs them into a logged-out state and an
//! [`OAuthEvent`](crate::auth::OAuthEvent). The types here cover
//! infrastructure failures only.

use thiserror::Error;

pub use crate::auth::{AuthError, TokenEndpointError};
pub use crate::config::ConfigError;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum FeedwireError {
    /// Authentication infrastructure failed
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Token endpoint could not be reached
    #[error("Token endpoint error: {0}")]
    TokenEndpoint(#[from] TokenEndpointError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialised
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Result type alias for Feedwire operations
pub type FeedwireResult<T> = std::result::Result<T, FeedwireError>;

impl FeedwireError {
    /// Stable label suitable for structured logging
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::TokenEndpoint(_) => "network",
            Self::Config(_) => "config",
            Self::Logging(_) => "logging",
        }
    }
}
