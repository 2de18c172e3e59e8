//! Async testing utilities

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::auth::OAuthEvent;

/// How long [`next_event`] waits
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Next OAuth event, or `None` on timeout or closed channel
///
/// Lagged receivers skip ahead to the oldest retained event.
pub async fn next_event(events: &mut broadcast::Receiver<OAuthEvent>) -> Option<OAuthEvent> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Poll an async condition until it holds or `timeout` elapses
///
/// # Examples
///
/// ```no_run
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use feedwire_common::testing::poll_until;
///
/// #[tokio::test]
/// async fn test_poll() {
///     let flag = Arc::new(AtomicBool::new(true));
///     let result = poll_until(Duration::from_secs(1), Duration::from_millis(10), || {
///         let flag = Arc::clone(&flag);
///         async move { flag.load(Ordering::SeqCst) }
///     })
///     .await;
///
///     assert!(result);
/// }
/// ```
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    false
}
