//! Browser login prompt with a loopback redirect listener
//!
//! Opens the authorization URL in the system browser and listens on the
//! redirect URL's loopback port until the provider sends the browser back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Uri;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use url::Url;

use super::token_manager::AuthError;
use super::traits::{AuthorizationOutcome, LoginPrompt};

/// How long the prompt waits for the browser to come back
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window and return to Feedwire.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Access was not granted.</p></body>
</html>"#;

/// Opens a URL in a browser
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Classify a browser navigation against the registered redirect URL
///
/// Returns `None` while the browser is elsewhere (scheme, host, port or path
/// differ). Once it reaches the redirect URL, a non-empty `code` query
/// parameter means consent was granted; anything else is a rejection.
///
/// # Examples
/// ```
/// use feedwire_common::auth::{classify_redirect, AuthorizationOutcome};
/// use url::Url;
///
/// let redirect = Url::parse("http://localhost:14488/callback").unwrap();
/// let back = Url::parse("http://localhost:14488/callback?code=xyz&state=abcdef").unwrap();
///
/// assert_eq!(
///     classify_redirect(&back, &redirect),
///     Some(AuthorizationOutcome::Granted("xyz".into()))
/// );
/// ```
#[must_use]
pub fn classify_redirect(current: &Url, redirect: &Url) -> Option<AuthorizationOutcome> {
    let reached = current.scheme() == redirect.scheme()
        && current.host_str() == redirect.host_str()
        && current.port_or_known_default() == redirect.port_or_known_default()
        && current.path() == redirect.path();

    if !reached {
        return None;
    }

    let code = current
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty());

    Some(code.map_or(AuthorizationOutcome::Rejected, AuthorizationOutcome::Granted))
}

/// [`LoginPrompt`] using the system browser and a one-shot loopback server
#[derive(Clone)]
pub struct LoopbackLoginPrompt {
    launcher: BrowserLauncher,
    timeout: Duration,
}

impl LoopbackLoginPrompt {
    /// Prompt that opens the default browser
    #[must_use]
    pub fn new() -> Self {
        Self { launcher: Arc::new(|url: &str| open::that(url)), timeout: DEFAULT_LOGIN_TIMEOUT }
    }

    /// Replace the browser launcher (embedded web view, tests)
    #[must_use]
    pub fn with_launcher(mut self, launcher: BrowserLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Change how long to wait for the redirect
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, auth_url: &str, redirect_url: &str) -> Result<AuthorizationOutcome, AuthError> {
        let redirect = Url::parse(redirect_url)
            .map_err(|e| AuthError::Prompt(format!("invalid redirect URL {redirect_url}: {e}")))?;

        let host = match redirect.host_str() {
            Some("localhost") | None => "127.0.0.1".to_string(),
            Some(host) => host.trim_start_matches('[').trim_end_matches(']').to_string(),
        };
        let port = redirect
            .port_or_known_default()
            .ok_or_else(|| AuthError::Prompt(format!("redirect URL has no port: {redirect_url}")))?;

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|e| AuthError::Prompt(format!("failed to bind OAuth loopback server: {e}")))?;

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let outcome_tx = Arc::new(Mutex::new(Some(outcome_tx)));
        let route_redirect = redirect.clone();

        let app = Router::new().route(
            redirect.path(),
            get(move |uri: Uri| {
                let outcome_tx = Arc::clone(&outcome_tx);
                let redirect = route_redirect.clone();
                async move { handle_redirect(&uri, &redirect, &outcome_tx) }
            }),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!(error = %err, "OAuth callback server error");
            }
        });

        debug!(%host, port, "OAuth loopback server listening");

        let outcome = match (self.launcher)(auth_url) {
            Ok(()) => {
                info!("waiting for OAuth redirect from browser");
                match tokio::time::timeout(self.timeout, outcome_rx).await {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(_)) => Err(AuthError::Prompt("callback server stopped".into())),
                    Err(_) => Err(AuthError::Prompt(format!(
                        "no OAuth redirect within {} seconds",
                        self.timeout.as_secs()
                    ))),
                }
            }
            Err(e) => Err(AuthError::Prompt(format!("failed to open browser: {e}"))),
        };

        let _ = shutdown_tx.send(());
        if let Err(err) = server.await {
            if err.is_panic() {
                error!("OAuth callback server panicked");
            }
        }

        outcome
    }
}

impl Default for LoopbackLoginPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoopbackLoginPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackLoginPrompt").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

#[async_trait]
impl LoginPrompt for LoopbackLoginPrompt {
    async fn authorize(&self, auth_url: &str, redirect_url: &str) -> AuthorizationOutcome {
        match self.run(auth_url, redirect_url).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "login prompt closed without authorization");
                AuthorizationOutcome::Rejected
            }
        }
    }
}

fn handle_redirect(
    uri: &Uri,
    redirect: &Url,
    outcome_tx: &Mutex<Option<oneshot::Sender<AuthorizationOutcome>>>,
) -> Html<&'static str> {
    let mut current = redirect.clone();
    current.set_query(uri.query());

    let outcome = classify_redirect(&current, redirect).unwrap_or(AuthorizationOutcome::Rejected);
    let page = match outcome {
        AuthorizationOutcome::Granted(_) => SUCCESS_PAGE,
        AuthorizationOutcome::Rejected => FAILURE_PAGE,
    };

    if let Some(tx) = outcome_tx.lock().take() {
        let _ = tx.send(outcome);
    }

    Html(page)
}
