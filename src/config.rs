// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Configuration loaded from environment variables (and an optional `.env`).

use crate::db::sqlite::DEFAULT_TTL_HOURS;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://api.ouraring.com";
const DEFAULT_AUTHORIZE_URL: &str = "https://cloud.ouraring.com/oauth/authorize";
const DEFAULT_TOKEN_URL: &str = "https://api.ouraring.com/oauth/token";
const DEFAULT_REVOKE_URL: &str = "https://api.ouraring.com/oauth/revoke";
const DEFAULT_SCOPES: &str = "daily heartrate personal";

/// OAuth client registration.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("revoke_url", &self.revoke_url)
            .finish()
    }
}

/// Where access tokens come from.
#[derive(Clone)]
pub enum CredentialSource {
    /// Long-lived personal access token; never refreshed
    PersonalToken(String),
    /// Authorization-code grant with refresh tokens persisted in the cache
    OAuth(OAuthSettings),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::PersonalToken(_) => f.write_str("PersonalToken(<redacted>)"),
            CredentialSource::OAuth(settings) => f.debug_tuple("OAuth").field(settings).finish(),
        }
    }
}

/// Retry and backoff parameters for upstream calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    /// Upper bound (exclusive) of the uniform jitter added to each delay
    pub max_jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: CredentialSource,
    /// Versioned REST API root
    pub api_base_url: String,
    /// Directory holding `cache.db`
    pub cache_dir: PathBuf,
    pub cache_ttl_hours: u32,
    pub retry: RetrySettings,
    /// Timeout for a single transport attempt
    pub request_timeout: Duration,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            credentials: CredentialSource::PersonalToken("test_personal_token".to_string()),
            api_base_url: "http://127.0.0.1:9".to_string(),
            cache_dir: env::temp_dir().join("oura-cache-test"),
            cache_ttl_hours: DEFAULT_TTL_HOURS,
            retry: RetrySettings {
                max_retries: 3,
                initial_delay_ms: 0,
                max_jitter_ms: 0,
            },
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A personal access token takes precedence over OAuth client settings.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let credentials = match non_empty_var("OURA_PERSONAL_ACCESS_TOKEN") {
            Some(token) => CredentialSource::PersonalToken(token),
            None => CredentialSource::OAuth(oauth_from_env()?),
        };

        let cache_dir = match non_empty_var("OURA_CACHE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_cache_dir()?,
        };

        let defaults = RetrySettings::default();

        Ok(Self {
            credentials,
            api_base_url: non_empty_var("OURA_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            cache_dir,
            cache_ttl_hours: parse_var("OURA_CACHE_TTL_HOURS", DEFAULT_TTL_HOURS)?,
            retry: RetrySettings {
                max_retries: parse_var("OURA_MAX_RETRIES", defaults.max_retries)?,
                initial_delay_ms: parse_var(
                    "OURA_RETRY_INITIAL_DELAY_MS",
                    defaults.initial_delay_ms,
                )?,
                max_jitter_ms: parse_var("OURA_RETRY_MAX_JITTER_MS", defaults.max_jitter_ms)?,
            },
            request_timeout: Duration::from_secs(parse_var("OURA_REQUEST_TIMEOUT_SECS", 30)?),
        })
    }

    /// Path of the SQLite cache file.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join("cache.db")
    }
}

fn oauth_from_env() -> Result<OAuthSettings, ConfigError> {
    let client_id = non_empty_var("OURA_CLIENT_ID").ok_or(ConfigError::Missing(
        "OURA_PERSONAL_ACCESS_TOKEN or OURA_CLIENT_ID",
    ))?;

    Ok(OAuthSettings {
        client_id,
        client_secret: non_empty_var("OURA_CLIENT_SECRET")
            .map(|v| v.trim().to_string())
            .ok_or(ConfigError::Missing("OURA_CLIENT_SECRET"))?,
        redirect_uri: non_empty_var("OURA_REDIRECT_URI")
            .ok_or(ConfigError::Missing("OURA_REDIRECT_URI"))?,
        scopes: non_empty_var("OURA_SCOPES").unwrap_or_else(|| DEFAULT_SCOPES.to_string()),
        authorize_url: non_empty_var("OURA_AUTHORIZE_URL")
            .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
        token_url: non_empty_var("OURA_TOKEN_URL")
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        revoke_url: non_empty_var("OURA_REVOKE_URL")
            .unwrap_or_else(|| DEFAULT_REVOKE_URL.to_string()),
    })
}

fn default_cache_dir() -> Result<PathBuf, ConfigError> {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
        .map(|p| p.join("oura-cache"))
        .ok_or(ConfigError::Missing("OURA_CACHE_DIR"))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
