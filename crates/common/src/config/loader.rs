//! Configuration loader
//!
//! ## Loading Strategy
//! 1. `.env` in the working directory is merged into the environment
//! 2. Environment variables are tried first
//! 3. If the required ones are missing, falls back to a config file
//! 4. Supports JSON and TOML formats (by extension)
//!
//! ## Environment Variables
//! - `FEEDWIRE_OAUTH_CLIENT_ID`: OAuth client ID (required)
//! - `FEEDWIRE_OAUTH_CLIENT_SECRET`: OAuth client secret (required)
//! - `FEEDWIRE_OAUTH_AUTHORIZATION_URL`: authorization endpoint
//! - `FEEDWIRE_OAUTH_TOKEN_URL`: token endpoint
//! - `FEEDWIRE_OAUTH_REDIRECT_URL`: registered redirect URI
//! - `FEEDWIRE_OAUTH_SCOPE`: requested scope
//! - `FEEDWIRE_OAUTH_GRANT_TYPE`: grant type of the initial exchange
//! - `FEEDWIRE_OAUTH_REFRESH_INTERVAL`: background timer cadence in seconds
//! - `FEEDWIRE_OAUTH_EXPIRY_WINDOW`: refresh this many seconds before expiry
//!
//! Optional variables default to the Inoreader registration and 15 minute
//! timers.
//!
//! ## File Format
//! ```toml
//! [oauth]
//! authorization_url = "https://www.inoreader.com/oauth2/auth"
//! token_url = "https://www.inoreader.com/oauth2/token"
//! client_id = "1000001234"
//! client_secret = "..."
//! scope = "read write"
//! ```
//!
//! ## File Locations
//! Probed in order: `feedwire.toml`, `feedwire.json`, `config.toml`,
//! `config.json` in the working directory, then next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use super::ConfigError;
use crate::auth::OAuthConfig;

const CLIENT_ID: &str = "FEEDWIRE_OAUTH_CLIENT_ID";
const CLIENT_SECRET: &str = "FEEDWIRE_OAUTH_CLIENT_SECRET";
const AUTHORIZATION_URL: &str = "FEEDWIRE_OAUTH_AUTHORIZATION_URL";
const TOKEN_URL: &str = "FEEDWIRE_OAUTH_TOKEN_URL";
const REDIRECT_URL: &str = "FEEDWIRE_OAUTH_REDIRECT_URL";
const SCOPE: &str = "FEEDWIRE_OAUTH_SCOPE";
const GRANT_TYPE: &str = "FEEDWIRE_OAUTH_GRANT_TYPE";
const REFRESH_INTERVAL: &str = "FEEDWIRE_OAUTH_REFRESH_INTERVAL";
const EXPIRY_WINDOW: &str = "FEEDWIRE_OAUTH_EXPIRY_WINDOW";

const CANDIDATE_FILES: [&str; 4] = ["feedwire.toml", "feedwire.json", "config.toml", "config.json"];

#[derive(Deserialize)]
struct ConfigFile {
    oauth: OAuthConfig,
}

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns [`ConfigError`] if neither the environment nor any config file
/// yields a complete, valid configuration
pub fn load() -> Result<OAuthConfig, ConfigError> {
    load_dotenv();

    match load_from_env() {
        Ok(config) => {
            tracing::info!("OAuth configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Merge `.env` from the working directory into the process environment
///
/// Existing variables win. A missing file is not an error.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => tracing::trace!("No .env file"),
        Err(e) => tracing::warn!(error = %e, "Could not load .env file"),
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns [`ConfigError::Missing`] when the client ID or secret is unset and
/// [`ConfigError::Invalid`] for unparsable values
pub fn load_from_env() -> Result<OAuthConfig, ConfigError> {
    let client_id = env_var(CLIENT_ID)?;
    let client_secret = env_var(CLIENT_SECRET)?;

    let mut config = OAuthConfig::inoreader(client_id, client_secret);

    if let Some(url) = env_opt(AUTHORIZATION_URL) {
        config.authorization_url = url;
    }
    if let Some(url) = env_opt(TOKEN_URL) {
        config.token_url = url;
    }
    if let Some(url) = env_opt(REDIRECT_URL) {
        config.redirect_url = url;
    }
    if let Some(scope) = env_opt(SCOPE) {
        config.scope = scope;
    }
    if let Some(grant_type) = env_opt(GRANT_TYPE) {
        config.token_grant_type = grant_type;
    }
    if let Some(secs) = env_parse::<u64>(REFRESH_INTERVAL)? {
        config.refresh_interval_secs = secs;
    }
    if let Some(secs) = env_parse::<u64>(EXPIRY_WINDOW)? {
        config.expiry_window_secs = secs;
    }

    validate(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns [`ConfigError::NotFound`] when no file exists,
/// [`ConfigError::Parse`] for malformed content and
/// [`ConfigError::Invalid`] for unusable values
pub fn load_from_file(path: Option<PathBuf>) -> Result<OAuthConfig, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound(p.display().to_string()));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ConfigError::NotFound("no config file in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading OAuth configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ConfigError::NotFound(format!("{}: {e}", config_path.display())))?;

    validate(parse_config(&contents, &config_path)?)
}

fn parse_config(contents: &str, path: &Path) -> Result<OAuthConfig, ConfigError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let file: ConfigFile = match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(format!("Invalid TOML format: {e}")))?,
        "json" => serde_json::from_str(contents)
            .map_err(|e| ConfigError::Parse(format!("Invalid JSON format: {e}")))?,
        other => return Err(ConfigError::Parse(format!("Unsupported config format: {other}"))),
    };

    Ok(file.oauth)
}

fn validate(config: OAuthConfig) -> Result<OAuthConfig, ConfigError> {
    for (name, value) in [
        ("authorization_url", &config.authorization_url),
        ("token_url", &config.token_url),
        ("redirect_url", &config.redirect_url),
    ] {
        url::Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{name} {value:?}: {e}")))?;
    }

    if config.client_id.trim().is_empty() {
        return Err(ConfigError::Invalid("client_id must not be empty".to_string()));
    }
    if config.refresh_interval_secs == 0 {
        return Err(ConfigError::Invalid("refresh_interval_secs must be positive".to_string()));
    }

    Ok(config)
}

/// First existing config file in the standard locations
#[must_use]
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(CANDIDATE_FILES.iter().map(|name| cwd.join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CANDIDATE_FILES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String, ConfigError> {
    env_opt(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
