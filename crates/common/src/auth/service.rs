//! High-level OAuth service
//!
//! Combines a [`TokenManager`] with a [`TokenStore`] so credentials survive
//! restarts: persisted tokens are restored on [`OAuthService::initialize`],
//! new tokens are saved as they arrive, and failures wipe the store.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::OAuthEvent;
use super::token_manager::{AuthError, TokenManager};
use super::traits::TokenStore;

/// Token manager with persistent credentials
pub struct OAuthService {
    manager: TokenManager,
    store: Arc<dyn TokenStore>,
    persister: Mutex<Option<JoinHandle<()>>>,
}

impl OAuthService {
    /// Wrap a manager; nothing is loaded until [`Self::initialize`]
    #[must_use]
    pub fn new(manager: TokenManager, store: Arc<dyn TokenStore>) -> Self {
        Self { manager, store, persister: Mutex::new(None) }
    }

    /// Restore stored tokens and start persisting new ones
    ///
    /// Returns `true` when tokens were found in the store. Calling it again
    /// reloads the store but keeps the single persister task.
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    pub fn initialize(&self) -> Result<bool, AuthError> {
        self.start_persister();

        match self.store.load()? {
            Some(tokens) => {
                info!(
                    fully_logged_in = tokens.is_fully_logged_in(),
                    "restored OAuth tokens from store"
                );
                self.manager.restore(tokens);
                Ok(true)
            }
            None => {
                debug!("no stored OAuth tokens");
                Ok(false)
            }
        }
    }

    /// Underlying token manager
    #[must_use]
    pub const fn manager(&self) -> &TokenManager {
        &self.manager
    }

    /// See [`TokenManager::login`]
    pub fn login(&self) -> bool {
        self.manager.login()
    }

    /// See [`TokenManager::bearer`]
    #[must_use]
    pub fn bearer(&self) -> String {
        self.manager.bearer()
    }

    /// Log out and remove stored credentials
    ///
    /// # Errors
    /// Returns error if the store cannot be cleared
    pub fn logout(&self) -> Result<(), AuthError> {
        self.manager.logout();
        self.store.clear()
    }

    fn start_persister(&self) {
        let mut persister = self.persister.lock();
        if persister.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let mut events = self.manager.subscribe();
        let manager = self.manager.clone();
        let store = Arc::clone(&self.store);

        *persister = Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "OAuth event persister lagged, saving current state");
                        if let Err(err) = store.save(&manager.snapshot()) {
                            warn!(error = %err, "failed to persist OAuth tokens");
                        }
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let result = match &event {
                    OAuthEvent::TokensReceived { .. } => store.save(&manager.snapshot()),
                    OAuthEvent::TokenError { .. } | OAuthEvent::AuthorizationFailed => store.clear(),
                };

                match result {
                    Ok(()) => debug!(event = event.name(), "OAuth token store updated"),
                    Err(err) => warn!(event = event.name(), error = %err, "failed to update OAuth token store"),
                }
            }
        }));
    }
}

impl Drop for OAuthService {
    fn drop(&mut self) {
        if let Some(handle) = self.persister.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for OAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthService").field("manager", &self.manager).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::service.
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::auth::{MemoryTokenStore, OAuthConfig, TokenState};
    use crate::testing::{
        next_event, poll_until, MockLoginPrompt, MockTokenEndpoint, RecordingNotifier,
    };

    fn service(store: MemoryTokenStore, endpoint: MockTokenEndpoint) -> OAuthService {
        let manager = TokenManager::new(
            OAuthConfig::inoreader("client-id", "client-secret"),
            Arc::new(endpoint),
            Arc::new(MockLoginPrompt::granting("auth-code")),
            Arc::new(RecordingNotifier::new()),
        )
        .unwrap();
        OAuthService::new(manager, Arc::new(store))
    }

    async fn settle(store: &MemoryTokenStore, expected: Option<&str>) -> bool {
        poll_until(Duration::from_secs(5), Duration::from_millis(10), move || async move {
            store.stored().map(|t| t.access_token).as_deref() == expected
        })
        .await
    }

    #[tokio::test]
    async fn test_initialize_restores_stored_tokens() {
        let expires_at = Some(Utc::now() + chrono::Duration::hours(1));
        let store = MemoryTokenStore::with_tokens(TokenState::new("A", "R", expires_at));
        let service = service(store, MockTokenEndpoint::new());

        assert!(service.initialize().unwrap());
        assert_eq!(service.bearer(), "Bearer A");
        assert!(service.login());
    }

    #[tokio::test]
    async fn test_initialize_with_empty_store() {
        let service = service(MemoryTokenStore::new(), MockTokenEndpoint::new());

        assert!(!service.initialize().unwrap());
        assert!(!service.manager().is_fully_logged_in());
    }

    #[tokio::test]
    async fn test_received_tokens_are_persisted() {
        let store = MemoryTokenStore::new();
        let endpoint = MockTokenEndpoint::new();
        endpoint.push_body(r#"{"access_token":"A2","refresh_token":"R2","expires_in":3600}"#);
        let service = service(store.clone(), endpoint);
        service.initialize().unwrap();
        let mut events = service.manager().subscribe();

        assert!(!service.login());
        assert!(matches!(next_event(&mut events).await, Some(OAuthEvent::TokensReceived { .. })));

        assert!(settle(&store, Some("A2")).await);
        assert_eq!(store.stored().unwrap().refresh_token, "R2");
    }

    #[tokio::test]
    async fn test_token_error_clears_store() {
        let store = MemoryTokenStore::with_tokens(TokenState::new("A", "R", None));
        let endpoint = MockTokenEndpoint::new();
        endpoint.push_body(r#"{"error":"invalid_grant"}"#);
        let service = service(store.clone(), endpoint);
        service.initialize().unwrap();

        assert!(!service.login());

        assert!(settle(&store, None).await);
    }

    #[tokio::test]
    async fn test_logout_clears_store() {
        let store = MemoryTokenStore::with_tokens(TokenState::new("A", "R", None));
        let service = service(store.clone(), MockTokenEndpoint::new());
        service.initialize().unwrap();

        service.logout().unwrap();

        assert_eq!(store.stored(), None);
        assert_eq!(service.manager().snapshot(), TokenState::default());
    }
}
