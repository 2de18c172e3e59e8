//! Shared infrastructure for the Feedwire desktop feed reader.
//!
//! The centrepiece is [`auth::TokenManager`], which owns the OAuth 2.0
//! authorization-code and refresh-token lifecycle for one cloud feed account.
//! Everything else in this crate is the plumbing it needs: configuration
//! loading, logging setup, error types, token persistence and test doubles.
//!
//! # Features
//!
//! - `keychain` (default): persist tokens in the platform keychain
//! - `loopback` (default): browser login prompt backed by a loopback listener
//! - `test-utils`: mock collaborators in [`testing`]

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod config;
pub mod error;
pub mod observability;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use auth::{AuthPhase, OAuthConfig, OAuthEvent, TokenManager};
pub use error::{FeedwireError, FeedwireResult};
pub use observability::{init_tracing, LogFormat};
