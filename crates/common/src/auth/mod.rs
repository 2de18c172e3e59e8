//! OAuth 2.0 session infrastructure
//!
//! Keeps a feed service account logged in: interactive authorization-code
//! login through the browser, silent refresh-token renewal, and a background
//! timer that refreshes ahead of expiry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  OAuthService   │  Restores / persists credentials
//! └────────┬────────┘
//!          │
//!          ├──► TokenManager        (state machine + refresh timer)
//!          │         │
//!          │         ├──► TokenEndpoint     (ReqwestTokenEndpoint)
//!          │         ├──► LoginPrompt       (LoopbackLoginPrompt)
//!          │         └──► NotificationSink  (TracingNotifier, GUI tray...)
//!          │
//!          └──► TokenStore          (KeychainTokenStore, MemoryTokenStore)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use feedwire_common::auth::{
//!     LoopbackLoginPrompt, OAuthConfig, OAuthEvent, ReqwestTokenEndpoint, TokenManager,
//!     TracingNotifier,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TokenManager::new(
//!         OAuthConfig::inoreader("your_client_id", "your_client_secret"),
//!         Arc::new(ReqwestTokenEndpoint::new()),
//!         Arc::new(LoopbackLoginPrompt::new()),
//!         Arc::new(TracingNotifier),
//!     )?;
//!
//!     let mut events = manager.subscribe();
//!     if !manager.login() {
//!         match events.recv().await? {
//!             OAuthEvent::TokensReceived { .. } => println!("logged in"),
//!             other => println!("login failed: {other:?}"),
//!         }
//!     }
//!
//!     let header = manager.bearer();
//!     println!("Authorization: {header}");
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - **[`types`]**: credentials, phases, token request/response shapes
//! - **[`config`]**: service registration and timer settings
//! - **[`token_manager`]**: the login state machine
//! - **[`client`]**: HTTP token endpoint
//! - **[`service`]**: persistence wrapper

#[cfg(feature = "loopback")]
pub mod callback;
pub mod client;
pub mod config;
pub mod events;
mod keychain;
pub mod notify;
pub mod service;
pub mod token_manager;
pub mod traits;
pub mod types;

#[cfg(feature = "loopback")]
pub use callback::{classify_redirect, BrowserLauncher, LoopbackLoginPrompt};
pub use client::{ReqwestTokenEndpoint, TokenEndpointError};
pub use config::OAuthConfig;
pub use events::OAuthEvent;
#[cfg(feature = "keychain")]
pub use keychain::KeychainTokenStore;
pub use keychain::MemoryTokenStore;
pub use notify::TracingNotifier;
pub use service::OAuthService;
pub use token_manager::{AuthError, TokenManager};
pub use traits::{
    AuthorizationOutcome, LoginPrompt, Notification, NotificationAction, NotificationSink,
    Severity, TokenEndpoint, TokenStore,
};
pub use types::{AuthPhase, GrantKind, TokenExchange, TokenRequest, TokenState};
