//! Logging setup
//!
//! Installs a global `tracing` subscriber. The filter comes from `RUST_LOG`
//! and defaults to [`DEFAULT_LOG_FILTER`].

use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{FeedwireError, FeedwireResult};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, colored
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = FeedwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(FeedwireError::Logging(format!("unknown log format: {other}"))),
        }
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns [`FeedwireError::Logging`] if a global subscriber is already set
pub fn init_tracing(format: LogFormat) -> FeedwireResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true))
            .try_init(),
    };

    result.map_err(|e| FeedwireError::Logging(e.to_string()))
}
