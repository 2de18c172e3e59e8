//! Credential persistence
//!
//! - [`KeychainTokenStore`]: platform keychain via `keyring` (macOS Keychain,
//!   Windows Credential Manager, Linux Secret Service)
//! - [`MemoryTokenStore`]: process-local store for tests and ephemeral runs
//!
//! The keychain layout keeps one entry per field so the refresh token never
//! shares a secret with metadata:
//!
//! ```text
//! access.<account>    access token
//! refresh.<account>   refresh token
//! metadata.<account>  {"expires_at": <unix seconds | null>}
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use super::token_manager::AuthError;
use super::traits::TokenStore;
use super::types::TokenState;

/// In-memory [`TokenStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Arc<Mutex<Option<TokenState>>>,
}

impl MemoryTokenStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with credentials
    #[must_use]
    pub fn with_tokens(tokens: TokenState) -> Self {
        Self { tokens: Arc::new(Mutex::new(Some(tokens))) }
    }

    /// Currently stored credentials
    #[must_use]
    pub fn stored(&self) -> Option<TokenState> {
        self.tokens.lock().clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenState>, AuthError> {
        Ok(self.tokens.lock().clone())
    }

    fn save(&self, tokens: &TokenState) -> Result<(), AuthError> {
        *self.tokens.lock() = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.tokens.lock() = None;
        Ok(())
    }
}

#[cfg(feature = "keychain")]
pub use platform::KeychainTokenStore;

#[cfg(feature = "keychain")]
mod platform {
    use std::fmt;
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use keyring::Entry;
    use serde::{Deserialize, Serialize};
    use tracing::{debug, warn};

    use super::{AuthError, TokenState, TokenStore};

    const ACCESS_PREFIX: &str = "access.";
    const REFRESH_PREFIX: &str = "refresh.";
    const METADATA_PREFIX: &str = "metadata.";

    #[derive(Serialize, Deserialize)]
    struct Metadata {
        expires_at: Option<i64>,
    }

    /// Named secrets of one keychain service
    trait SecretBackend: Send + Sync + fmt::Debug {
        fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
        fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;
        fn delete(&self, key: &str) -> Result<(), AuthError>;
    }

    #[derive(Debug)]
    struct KeyringBackend {
        service_name: String,
    }

    impl KeyringBackend {
        fn entry(&self, key: &str) -> Result<Entry, AuthError> {
            Entry::new(&self.service_name, key).map_err(|e| {
                AuthError::Keychain(format!("Failed to create keychain entry: {e}"))
            })
        }
    }

    impl SecretBackend for KeyringBackend {
        fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
            match self.entry(key)?.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(AuthError::Keychain(format!("Failed to read {key}: {e}"))),
            }
        }

        fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
            self.entry(key)?
                .set_password(value)
                .map_err(|e| AuthError::Keychain(format!("Failed to store {key}: {e}")))
        }

        fn delete(&self, key: &str) -> Result<(), AuthError> {
            match self.entry(key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(AuthError::Keychain(format!("Failed to delete {key}: {e}"))),
            }
        }
    }

    /// [`TokenStore`] backed by the platform keychain
    #[derive(Debug, Clone)]
    pub struct KeychainTokenStore {
        backend: Arc<dyn SecretBackend>,
        account: String,
    }

    impl KeychainTokenStore {
        /// Store for `account` under keychain service `service_name`
        ///
        /// # Examples
        /// ```
        /// use feedwire_common::auth::KeychainTokenStore;
        ///
        /// let store = KeychainTokenStore::new("Feedwire.inoreader", "main");
        /// assert_eq!(store.account(), "main");
        /// ```
        pub fn new(service_name: impl Into<String>, account: impl Into<String>) -> Self {
            Self::with_backend(
                Arc::new(KeyringBackend { service_name: service_name.into() }),
                account,
            )
        }

        fn with_backend(
            backend: Arc<dyn SecretBackend>,
            account: impl Into<String>,
        ) -> Self {
            Self { backend, account: account.into() }
        }

        /// Account name the entries are keyed by
        #[must_use]
        pub fn account(&self) -> &str {
            &self.account
        }

        fn key(&self, prefix: &str) -> String {
            format!("{prefix}{}", self.account)
        }

        // Puts back what `keys` held before a failed save; best effort.
        fn roll_back(&self, keys: &[String], previous: &[Option<String>]) {
            for (key, old) in keys.iter().zip(previous) {
                let restored = match old {
                    Some(value) => self.backend.set(key, value),
                    None => self.backend.delete(key),
                };
                if let Err(err) = restored {
                    warn!(%key, error = %err, "failed to roll back keychain entry");
                }
            }
        }
    }

    impl TokenStore for KeychainTokenStore {
        fn load(&self) -> Result<Option<TokenState>, AuthError> {
            let Some(access_token) = self.backend.get(&self.key(ACCESS_PREFIX))? else {
                debug!(account = %self.account, "no OAuth tokens in keychain");
                return Ok(None);
            };
            let refresh_token = self.backend.get(&self.key(REFRESH_PREFIX))?.unwrap_or_default();

            let expires_at = match self.backend.get(&self.key(METADATA_PREFIX))? {
                Some(raw) => serde_json::from_str::<Metadata>(&raw)
                    .map_err(|e| AuthError::Keychain(format!("Corrupt token metadata: {e}")))?
                    .expires_at
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                None => None,
            };

            debug!(account = %self.account, "OAuth tokens loaded from keychain");
            Ok(Some(TokenState::new(access_token, refresh_token, expires_at)))
        }

        /// Writes the three entries as a group: when one write fails, the
        /// entries already written get their previous values back.
        fn save(&self, tokens: &TokenState) -> Result<(), AuthError> {
            let metadata = Metadata { expires_at: tokens.expires_at.map(|at| at.timestamp()) };
            let metadata = serde_json::to_string(&metadata)
                .map_err(|e| AuthError::Keychain(format!("Failed to encode metadata: {e}")))?;

            let keys = [ACCESS_PREFIX, REFRESH_PREFIX, METADATA_PREFIX].map(|p| self.key(p));
            let values =
                [tokens.access_token.as_str(), tokens.refresh_token.as_str(), metadata.as_str()];
            let previous = keys
                .iter()
                .map(|key| self.backend.get(key))
                .collect::<Result<Vec<_>, _>>()?;

            for (written, (key, value)) in keys.iter().zip(values).enumerate() {
                if let Err(err) = self.backend.set(key, value) {
                    self.roll_back(&keys[..written], &previous[..written]);
                    return Err(err);
                }
            }

            debug!(account = %self.account, "OAuth tokens stored in keychain");
            Ok(())
        }

        fn clear(&self) -> Result<(), AuthError> {
            self.backend.delete(&self.key(ACCESS_PREFIX))?;
            self.backend.delete(&self.key(REFRESH_PREFIX))?;
            self.backend.delete(&self.key(METADATA_PREFIX))?;
            debug!(account = %self.account, "OAuth tokens removed from keychain");
            Ok(())
        }
    }

}
