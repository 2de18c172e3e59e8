//! Collaborator seams of the token manager
//!
//! These traits enable dependency injection and testing by abstracting the
//! external pieces the OAuth flow talks to: the token endpoint, the browser
//! login prompt, the user notification area and the token persistence store.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::client::TokenEndpointError;
use super::token_manager::AuthError;
use super::types::{TokenRequest, TokenState};

/// Transport for token endpoint exchanges
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// POST the form-encoded request and return the raw response body
    ///
    /// The body must be returned for error statuses too: OAuth servers put
    /// the `error` JSON in 4xx responses.
    ///
    /// # Errors
    /// Returns error if the request could not be delivered or the body could
    /// not be read
    async fn post_form(&self, request: &TokenRequest) -> Result<Vec<u8>, TokenEndpointError>;
}

/// Result of the interactive consent step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// Browser reached the redirect URL carrying this authorization code
    Granted(String),
    /// User declined, closed the prompt, or the redirect carried an error
    Rejected,
}

/// Browser-based login prompt
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    /// Show `auth_url` and wait until navigation reaches `redirect_url`
    async fn authorize(&self, auth_url: &str, redirect_url: &str) -> AuthorizationOutcome;
}

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Progress information
    Information,
    /// Something needs attention
    Warning,
    /// Action is required
    Critical,
}

/// Callback run when the user activates a notification
pub type NotificationAction = Arc<dyn Fn() + Send + Sync>;

/// User-facing message, optionally clickable
#[derive(Clone)]
pub struct Notification {
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// How prominently to show it
    pub severity: Severity,
    /// Run on click
    pub action: Option<NotificationAction>,
}

impl Notification {
    /// Notification without an action
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self { title: title.into(), message: message.into(), severity, action: None }
    }

    /// Attach a click action
    #[must_use]
    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Run the click action, if any
    pub fn activate(&self) {
        if let Some(action) = &self.action {
            action();
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("title", &self.title)
            .field("message", &self.message)
            .field("severity", &self.severity)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Where user-facing notifications go (tray balloon, status bar, log...)
pub trait NotificationSink: Send + Sync {
    /// Show a notification; must not block
    fn notify(&self, notification: Notification);
}

/// Persistence for credentials across process runs
pub trait TokenStore: Send + Sync {
    /// Load stored credentials; `Ok(None)` when nothing was stored
    ///
    /// # Errors
    /// Returns error if the backing store cannot be read
    fn load(&self) -> Result<Option<TokenState>, AuthError>;

    /// Replace stored credentials
    ///
    /// # Errors
    /// Returns error if the backing store cannot be written
    fn save(&self, tokens: &TokenState) -> Result<(), AuthError>;

    /// Remove stored credentials (idempotent)
    ///
    /// # Errors
    /// Returns error if the backing store cannot be written
    fn clear(&self) -> Result<(), AuthError>;
}
