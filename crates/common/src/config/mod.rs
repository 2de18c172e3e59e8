//! Configuration loading
//!
//! Builds an [`OAuthConfig`](crate::auth::OAuthConfig) from environment
//! variables (optionally seeded from a `.env` file) or from a TOML/JSON file.

use thiserror::Error;

pub mod loader;

pub use loader::{load, load_dotenv, load_from_env, load_from_file, probe_config_paths};

/// Error type for configuration loading
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is not set
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    /// Value present but unusable
    #[error("Invalid configuration value: {0}")]
    Invalid(String),

    /// Config file could not be located or read
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Config file content could not be parsed
    #[error("Failed to parse config file: {0}")]
    Parse(String),
}
