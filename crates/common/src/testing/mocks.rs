//! Mock implementations of the token manager collaborators
//!
//! All mocks are cheap to clone; clones share recorded calls and scripted
//! responses, so a test keeps one handle and gives the manager another.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::auth::{
    AuthorizationOutcome, LoginPrompt, Notification, NotificationSink, TokenEndpoint,
    TokenEndpointError, TokenRequest,
};

#[derive(Debug, Clone)]
enum ScriptedResponse {
    Body(Vec<u8>),
    TransportError(String),
}

/// Optional barrier a mock waits on before answering
#[derive(Debug, Clone, Default)]
struct Gate {
    notify: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl Gate {
    fn hold(&self) {
        *self.notify.lock() = Some(Arc::new(Notify::new()));
    }

    fn release(&self) {
        if let Some(notify) = self.notify.lock().take() {
            notify.notify_one();
        }
    }

    async fn pass(&self) {
        let notify = self.notify.lock().clone();
        if let Some(notify) = notify {
            notify.notified().await;
        }
    }
}

/// Token endpoint answering from a script
///
/// # Examples
/// ```
/// use feedwire_common::testing::MockTokenEndpoint;
///
/// let endpoint = MockTokenEndpoint::new();
/// endpoint.push_body(r#"{"access_token":"A","refresh_token":"R","expires_in":3600}"#);
/// assert!(endpoint.requests().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTokenEndpoint {
    responses: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<Mutex<Vec<TokenRequest>>>,
    received: Arc<Notify>,
    gate: Gate,
}

impl MockTokenEndpoint {
    /// Endpoint with an empty script (every request fails to connect)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response body
    pub fn push_body(&self, body: impl Into<Vec<u8>>) {
        self.responses.lock().push_back(ScriptedResponse::Body(body.into()));
    }

    /// Queue a JSON response body
    pub fn push_json(&self, body: &serde_json::Value) {
        self.push_body(body.to_string());
    }

    /// Queue a transport failure
    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.responses.lock().push_back(ScriptedResponse::TransportError(message.into()));
    }

    /// Block answers until [`Self::release`]; requests are still recorded
    pub fn hold(&self) {
        self.gate.hold();
    }

    /// Let a held answer through
    pub fn release(&self) {
        self.gate.release();
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<TokenRequest> {
        self.requests.lock().clone()
    }

    /// Wait until at least `count` requests arrived
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let received = self.received.notified();
                if self.requests.lock().len() >= count {
                    return;
                }
                received.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl TokenEndpoint for MockTokenEndpoint {
    async fn post_form(&self, request: &TokenRequest) -> Result<Vec<u8>, TokenEndpointError> {
        self.requests.lock().push(request.clone());
        self.received.notify_waiters();

        self.gate.pass().await;

        let scripted = self.responses.lock().pop_front();
        match scripted {
            Some(ScriptedResponse::Body(body)) => Ok(body),
            Some(ScriptedResponse::TransportError(message)) => {
                Err(TokenEndpointError::Unavailable(message))
            }
            None => Err(TokenEndpointError::Unavailable("no scripted response".to_string())),
        }
    }
}

/// Login prompt with a fixed outcome
#[derive(Debug, Clone)]
pub struct MockLoginPrompt {
    outcome: Arc<Mutex<AuthorizationOutcome>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    received: Arc<Notify>,
    gate: Gate,
}

impl MockLoginPrompt {
    /// Prompt that grants `code`
    #[must_use]
    pub fn granting(code: impl Into<String>) -> Self {
        Self::with_outcome(AuthorizationOutcome::Granted(code.into()))
    }

    /// Prompt the user always closes
    #[must_use]
    pub fn rejecting() -> Self {
        Self::with_outcome(AuthorizationOutcome::Rejected)
    }

    fn with_outcome(outcome: AuthorizationOutcome) -> Self {
        Self {
            outcome: Arc::new(Mutex::new(outcome)),
            calls: Arc::default(),
            received: Arc::default(),
            gate: Gate::default(),
        }
    }

    /// Change the outcome of later prompts
    pub fn set_outcome(&self, outcome: AuthorizationOutcome) {
        *self.outcome.lock() = outcome;
    }

    /// Keep the prompt open until [`Self::release`]
    pub fn hold(&self) {
        self.gate.hold();
    }

    /// Close a held prompt with the scripted outcome
    pub fn release(&self) {
        self.gate.release();
    }

    /// `(auth_url, redirect_url)` of every prompt shown
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    /// Wait until at least `count` prompts were shown
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let received = self.received.notified();
                if self.calls.lock().len() >= count {
                    return;
                }
                received.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl LoginPrompt for MockLoginPrompt {
    async fn authorize(&self, auth_url: &str, redirect_url: &str) -> AuthorizationOutcome {
        self.calls.lock().push((auth_url.to_string(), redirect_url.to_string()));
        self.received.notify_waiters();

        self.gate.pass().await;

        self.outcome.lock().clone()
    }
}

/// Notification sink that keeps everything it is shown
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications shown so far
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    /// Most recent notification
    #[must_use]
    pub fn last(&self) -> Option<Notification> {
        self.notifications.lock().last().cloned()
    }

    /// Forget recorded notifications
    pub fn clear(&self) {
        self.notifications.lock().clear();
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for testing::mocks.
    use super::*;
    use crate::auth::{OAuthConfig, Severity};

    fn request() -> TokenRequest {
        TokenRequest::refresh(&OAuthConfig::inoreader("id", "secret"), "R")
    }

    #[tokio::test]
    async fn test_endpoint_answers_in_script_order() {
        let endpoint = MockTokenEndpoint::new();
        endpoint.push_body("first");
        endpoint.push_transport_error("down");

        assert_eq!(endpoint.post_form(&request()).await.unwrap(), b"first");
        assert!(endpoint.post_form(&request()).await.is_err());
        assert!(endpoint.post_form(&request()).await.is_err());
        assert_eq!(endpoint.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_held_endpoint_records_before_answering() {
        let endpoint = MockTokenEndpoint::new();
        endpoint.hold();
        endpoint.push_body("late");

        let task = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.post_form(&request()).await })
        };

        assert!(endpoint.wait_for_requests(1, Duration::from_secs(5)).await);
        assert!(!task.is_finished());

        endpoint.release();
        assert_eq!(task.await.unwrap().unwrap(), b"late");
    }

    #[tokio::test]
    async fn test_prompt_records_calls() {
        let prompt = MockLoginPrompt::rejecting();

        let outcome = prompt.authorize("https://a", "http://b").await;

        assert_eq!(outcome, AuthorizationOutcome::Rejected);
        assert_eq!(prompt.calls(), vec![("https://a".to_string(), "http://b".to_string())]);
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::new("t", "m", Severity::Warning));

        assert_eq!(notifier.last().unwrap().severity, Severity::Warning);
        notifier.clear();
        assert!(notifier.notifications().is_empty());
    }
}
