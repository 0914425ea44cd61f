//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use lexilearn_core::HintPolicy;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub storage_path: PathBuf,
    pub log_level: Level,
    pub http_timeout: Duration,
    pub hint_policy: HintPolicy,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Remote API ---
        let api_url = lookup("LEXILEARN_API_URL")
            .unwrap_or_else(|| "http://localhost:8000/api".to_string());
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "LEXILEARN_API_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_url),
            ));
        }
        let api_url = api_url.trim_end_matches('/').to_string();

        let timeout_str =
            lookup("LEXILEARN_HTTP_TIMEOUT_SECS").unwrap_or_else(|| "30".to_string());
        let http_timeout = timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "LEXILEARN_HTTP_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                )
            })?;

        // --- Local State and Logging ---
        let storage_path = lookup("LEXILEARN_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.lexilearn/storage.json"));

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "WARN".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Study Behaviour ---
        let hint_policy = match lookup("LEXILEARN_HINT_POLICY") {
            Some(value) => value
                .parse::<HintPolicy>()
                .map_err(|e| ConfigError::InvalidValue("LEXILEARN_HINT_POLICY".to_string(), e))?,
            None => HintPolicy::default(),
        };

        Ok(Self {
            api_url,
            storage_path,
            log_level,
            http_timeout,
            hint_policy,
        })
    }
}
