//! Token endpoint HTTP client
//!
//! Posts form-encoded token requests with `reqwest` and hands the raw body
//! back to the token manager, which owns all interpretation of the answer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use super::traits::TokenEndpoint;
use super::types::{TokenRequest, FORM_CONTENT_TYPE};

/// Default request timeout for token exchanges
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable that disables system proxy detection
pub const DISABLE_PROXY_ENV: &str = "FEEDWIRE_DISABLE_PROXY";

/// Error type for token endpoint transport
#[derive(Debug, Error)]
pub enum TokenEndpointError {
    /// HTTP request failed before a body was received
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server error status without a body to interpret
    #[error("Token endpoint unavailable: {0}")]
    Unavailable(String),
}

/// [`TokenEndpoint`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTokenEndpoint {
    client: Client,
}

impl ReqwestTokenEndpoint {
    /// Create a client with the default 30 second timeout
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let builder = Client::builder().timeout(timeout);
        let builder = if std::env::var_os(DISABLE_PROXY_ENV).is_some() {
            builder.no_proxy()
        } else {
            builder
        };

        let client = builder.build().unwrap_or_else(|err| {
            warn!(error = %err, "failed to build configured HTTP client, using defaults");
            Client::new()
        });

        Self { client }
    }

    /// Wrap an existing client (shared connection pool, custom TLS...)
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTokenEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenEndpoint for ReqwestTokenEndpoint {
    async fn post_form(&self, request: &TokenRequest) -> Result<Vec<u8>, TokenEndpointError> {
        let response = self
            .client
            .post(request.url())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(request.encoded_body())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        debug!(
            url = request.url(),
            grant = ?request.kind(),
            status = status.as_u16(),
            body_len = body.len(),
            "token endpoint responded"
        );

        if status.is_server_error() && body.is_empty() {
            return Err(TokenEndpointError::Unavailable(format!("HTTP {status}")));
        }

        Ok(body.to_vec())
    }
}
