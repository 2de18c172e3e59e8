//! Integration tests for `feedwire_common::auth::TokenManager`
//!
//! Drives the login state machine through its public API with scripted
//! collaborators: interactive authorization, silent refresh, failures,
//! logout and the background refresh timer.

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use feedwire_common::auth::{
    AuthPhase, AuthorizationOutcome, GrantKind, OAuthConfig, OAuthEvent, Severity, TokenManager,
    TokenState,
};
use feedwire_common::testing::{next_event, MockLoginPrompt, MockTokenEndpoint, RecordingNotifier};

struct Fixture {
    manager: TokenManager,
    endpoint: MockTokenEndpoint,
    prompt: MockLoginPrompt,
    notifier: RecordingNotifier,
}

fn fixture_with(config: OAuthConfig, prompt: MockLoginPrompt) -> Fixture {
    let endpoint = MockTokenEndpoint::new();
    let notifier = RecordingNotifier::new();
    let manager = TokenManager::new(
        config,
        Arc::new(endpoint.clone()),
        Arc::new(prompt.clone()),
        Arc::new(notifier.clone()),
    )
    .unwrap();

    Fixture { manager, endpoint, prompt, notifier }
}

fn fixture() -> Fixture {
    fixture_with(OAuthConfig::inoreader("1000001", "s3cret"), MockLoginPrompt::granting("code-42"))
}

const GRANTED: &str = r#"{"access_token":"A","refresh_token":"R","expires_in":3600}"#;

/// Validates the full interactive login round trip.
///
/// # Test Steps
/// 1. `login()` on a fresh manager opens the prompt and returns `false`
/// 2. The granted code is exchanged with the configured registration
/// 3. `TokensReceived` carries the endpoint payload
/// 4. `bearer()` now yields the header without notifying
#[tokio::test]
async fn interactive_login_round_trip() {
    let f = fixture();
    f.endpoint.push_body(GRANTED);
    let mut events = f.manager.subscribe();

    assert!(!f.manager.login());
    assert_eq!(f.manager.phase(), AuthPhase::Authorizing);

    assert_eq!(
        next_event(&mut events).await,
        Some(OAuthEvent::TokensReceived {
            access_token: "A".into(),
            refresh_token: "R".into(),
            expires_in: 3600,
        })
    );

    let requests = f.endpoint.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.kind(), GrantKind::AuthorizationCode);
    assert_eq!(request.url(), "https://www.inoreader.com/oauth2/token");
    assert_eq!(request.param("client_id"), Some("1000001"));
    assert_eq!(request.param("client_secret"), Some("s3cret"));
    assert_eq!(request.param("code"), Some("code-42"));
    assert_eq!(request.param("redirect_uri"), Some("http://localhost:14488/callback"));
    assert_eq!(request.param("grant_type"), Some("authorization_code"));

    let calls = f.prompt.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.starts_with("https://www.inoreader.com/oauth2/auth?client_id=1000001"));
    assert!(calls[0].0.ends_with("&response_type=code&state=abcdef"));

    f.notifier.clear();
    assert_eq!(f.manager.phase(), AuthPhase::LoggedIn);
    assert!(f.manager.is_fully_logged_in());
    assert_eq!(f.manager.bearer(), "Bearer A");
    assert!(f.notifier.notifications().is_empty());
}

/// Validates that closing the login prompt logs out and reports
/// `AuthorizationFailed` without contacting the token endpoint.
#[tokio::test]
async fn rejected_consent_reports_authorization_failed() {
    let f = fixture_with(OAuthConfig::inoreader("id", "secret"), MockLoginPrompt::rejecting());
    let mut events = f.manager.subscribe();

    assert!(!f.manager.login());

    assert_eq!(next_event(&mut events).await, Some(OAuthEvent::AuthorizationFailed));
    assert!(f.endpoint.requests().is_empty());
    assert_eq!(f.manager.phase(), AuthPhase::LoggedOut);
    assert_eq!(f.manager.snapshot(), TokenState::default());
}

/// Validates that a new login is possible after a rejection.
#[tokio::test]
async fn login_again_after_rejection() {
    let f = fixture_with(OAuthConfig::inoreader("id", "secret"), MockLoginPrompt::rejecting());
    let mut events = f.manager.subscribe();

    f.manager.login();
    assert_eq!(next_event(&mut events).await, Some(OAuthEvent::AuthorizationFailed));

    f.prompt.set_outcome(AuthorizationOutcome::Granted("second".into()));
    f.endpoint.push_body(GRANTED);
    f.manager.login();

    assert!(matches!(next_event(&mut events).await, Some(OAuthEvent::TokensReceived { .. })));
    assert_eq!(f.endpoint.requests()[0].param("code"), Some("second"));
}

/// Validates silent refresh of an expired session: the refresh grant is
/// used, no prompt is shown, and the new tokens replace the old ones.
#[tokio::test]
async fn expired_session_refreshes_silently() {
    let f = fixture();
    f.manager.restore(TokenState::new(
        "old",
        "R-old",
        Some(Utc::now() - chrono::Duration::minutes(1)),
    ));
    f.endpoint
        .push_body(r#"{"access_token":"new","refresh_token":"R-new","expires_in":7200}"#);
    let mut events = f.manager.subscribe();

    assert!(!f.manager.is_fully_logged_in());
    assert!(!f.manager.login());
    assert_eq!(f.manager.phase(), AuthPhase::Refreshing);

    assert!(matches!(next_event(&mut events).await, Some(OAuthEvent::TokensReceived { .. })));

    let request = &f.endpoint.requests()[0];
    assert_eq!(request.kind(), GrantKind::Refresh);
    assert_eq!(request.param("refresh_token"), Some("R-old"));
    assert_eq!(request.param("grant_type"), Some("refresh_token"));
    assert_eq!(request.param("code"), None);
    assert!(f.prompt.calls().is_empty());

    assert_eq!(f.manager.access_token(), "new");
    assert_eq!(f.manager.refresh_token(), "R-new");

    let notification = f.notifier.last().unwrap();
    assert_eq!(notification.severity, Severity::Information);
    assert_eq!(notification.title, "Logging in via OAuth 2.0...");
    assert_eq!(
        notification.message,
        "Refreshing login tokens for 'https://www.inoreader.com/oauth2/token'..."
    );
}

/// Validates that a rejected refresh token wipes the session and reports
/// the server's error.
#[tokio::test]
async fn rejected_refresh_logs_out() {
    let f = fixture();
    f.manager.set_refresh_token("revoked");
    f.endpoint.push_body(
        r#"{"error":"invalid_grant","error_description":"Refresh token is invalid"}"#,
    );
    let mut events = f.manager.subscribe();

    f.manager.login();

    assert_eq!(
        next_event(&mut events).await,
        Some(OAuthEvent::TokenError {
            error: "invalid_grant".into(),
            error_description: "Refresh token is invalid".into(),
        })
    );
    assert_eq!(f.manager.snapshot(), TokenState::default());
    assert!(!f.manager.is_refresh_timer_armed());
    assert_eq!(f.manager.phase(), AuthPhase::LoggedOut);
}

/// Validates that a transport failure is reported as a malformed response
/// and never leaves the manager stuck in an exchange phase.
#[tokio::test]
async fn transport_failure_is_reported_as_malformed_response() {
    let f = fixture();
    f.manager.set_refresh_token("R");
    f.endpoint.push_transport_error("connection refused");
    let mut events = f.manager.subscribe();

    f.manager.login();

    assert_eq!(
        next_event(&mut events).await,
        Some(OAuthEvent::TokenError {
            error: "malformed_response".into(),
            error_description: String::new(),
        })
    );
    assert_eq!(f.manager.phase(), AuthPhase::LoggedOut);
}

/// Validates lenient parsing: an object without `error` but with a token
/// is a success, and missing fields default to empty / zero.
#[tokio::test]
async fn partial_success_response_is_accepted() {
    let f = fixture();
    let mut events = f.manager.subscribe();

    f.manager.handle_token_response(br#"{"access_token":"A"}"#);

    assert_eq!(
        next_event(&mut events).await,
        Some(OAuthEvent::TokensReceived {
            access_token: "A".into(),
            refresh_token: String::new(),
            expires_in: 0,
        })
    );
    assert!(!f.manager.is_fully_logged_in());
    assert!(!f.manager.is_refresh_timer_armed());
    assert_eq!(f.manager.phase(), AuthPhase::LoggedOut);
}

/// Validates that an object carrying neither `error` nor any token is a
/// malformed response: the session is logged out and `TokenError` is raised
/// instead of storing empty credentials.
#[tokio::test]
async fn response_without_tokens_is_malformed() {
    let f = fixture();
    f.manager.restore(TokenState::new("A", "R", Some(Utc::now() + chrono::Duration::hours(1))));
    assert!(f.manager.is_refresh_timer_armed());
    let mut events = f.manager.subscribe();

    f.manager.handle_token_response(br#"{"message":"upstream unavailable"}"#);

    assert_eq!(
        next_event(&mut events).await,
        Some(OAuthEvent::TokenError {
            error: "malformed_response".into(),
            error_description: String::new(),
        })
    );
    assert_eq!(f.manager.snapshot(), TokenState::default());
    assert!(!f.manager.is_refresh_timer_armed());
    assert_eq!(f.manager.phase(), AuthPhase::LoggedOut);
}

/// Validates that clones share one session.
#[tokio::test]
async fn clones_share_session() {
    let f = fixture();
    let other = f.manager.clone();

    f.manager.handle_token_response(GRANTED.as_bytes());

    assert_eq!(other.bearer(), "Bearer A");
    other.logout();
    assert!(!f.manager.is_fully_logged_in());
}

/// Validates the background timer end to end with paused time: tokens that
/// expire in ten minutes are refreshed on the first tick, fifteen minutes
/// after they were stored, and the refreshed tokens re-arm the timer.
#[tokio::test(start_paused = true)]
async fn background_timer_refreshes_before_expiry() {
    let f = fixture();
    f.endpoint.push_body(r#"{"access_token":"A2","refresh_token":"R2","expires_in":3600}"#);
    let mut events = f.manager.subscribe();

    f.manager.handle_token_response(br#"{"access_token":"A","refresh_token":"R","expires_in":600}"#);
    assert!(matches!(next_event(&mut events).await, Some(OAuthEvent::TokensReceived { .. })));
    assert!(f.manager.is_refresh_timer_armed());

    tokio::time::advance(Duration::from_secs(15 * 60 + 1)).await;

    assert!(matches!(next_event(&mut events).await, Some(OAuthEvent::TokensReceived { .. })));
    assert_eq!(f.manager.access_token(), "A2");
    assert_eq!(f.endpoint.requests()[0].param("refresh_token"), Some("R"));
    assert!(f.manager.is_refresh_timer_armed());
}

/// Validates that the timer leaves a session alone while its expiry is
/// outside the window.
#[tokio::test(start_paused = true)]
async fn background_timer_skips_fresh_tokens() {
    let f = fixture();
    f.manager.handle_token_response(GRANTED.as_bytes());

    tokio::time::advance(Duration::from_secs(15 * 60 + 1)).await;
    tokio::task::yield_now().await;

    assert!(f.endpoint.requests().is_empty());
    assert_eq!(f.manager.phase(), AuthPhase::LoggedIn);
}
