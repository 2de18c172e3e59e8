//! Testing utilities and helpers
//!
//! - **[`mocks`]**: scripted token endpoint, login prompt and notification
//!   sink
//! - **[`async_utils`]**: waiting on events and conditions with a timeout
//!
//! Available to unit tests and, with the `test-utils` feature, to
//! integration tests and downstream crates.

pub mod async_utils;
pub mod mocks;

pub use async_utils::{next_event, poll_until, EVENT_TIMEOUT};
pub use mocks::{MockLoginPrompt, MockTokenEndpoint, RecordingNotifier};
