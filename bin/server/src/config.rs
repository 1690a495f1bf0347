//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys
//! use `__` as the separator (`DATABASE__URL`, `SESSION__TTL_MINUTES`).
//!
//! See [`GitHubConfig`](tacokumo_admin_platform_access::GitHubConfig) for
//! the OAuth application settings.

use serde::Deserialize;
use std::time::Duration;
use tacokumo_admin_platform_access::GitHubConfig;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Where browsers land after signing in when the login carried no
    /// redirect URI.
    pub frontend_url: String,

    /// Upper bound on the time spent handling a single request.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    pub database: DatabaseConfig,

    pub redis: RedisConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// GitHub OAuth application configuration.
    pub github: GitHubConfig,

    /// Bearer JWT validation. Absent disables JWT authentication.
    #[serde(default)]
    pub jwt: Option<JwtConfig>,

    #[serde(default)]
    pub cors: CorsConfig,
}

/// PostgreSQL settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL database connection URL.
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Extra attempts made when the first connection fails, one second apart.
    #[serde(default = "default_initial_conn_retry")]
    pub initial_conn_retry: u32,
}

/// Redis settings for the session and state stores.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL, e.g. `redis://localhost:6379/0`.
    pub url: String,

    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Timeout for acquiring, creating and recycling pooled connections.
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in minutes.
    #[serde(default = "default_session_ttl_minutes")]
    pub ttl_minutes: i64,

    /// Lifetime of a pending login, in minutes.
    #[serde(default = "default_state_ttl_minutes")]
    pub state_ttl_minutes: i64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

/// Settings for validating bearer JWTs issued by an external provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Expected `iss` claim.
    pub issuer: String,

    /// Accepted client ids, comma-separated. Matched against `client_id`,
    /// then `aud`.
    pub client_ids: String,

    /// JWKS location. Defaults to `<issuer>/.well-known/jwks.json`.
    #[serde(default)]
    pub jwks_url: Option<String>,

    #[serde(default = "default_jwks_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,
}

/// Cross-origin settings for the browser frontend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins, comma-separated. Empty disables CORS headers.
    #[serde(default)]
    pub allow_origins: String,

    #[serde(default)]
    pub allow_credentials: bool,

    #[serde(default = "default_cors_max_age_seconds")]
    pub max_age_seconds: u64,
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    5
}

fn default_initial_conn_retry() -> u32 {
    1
}

fn default_redis_pool_size() -> usize {
    16
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_session_ttl_minutes() -> i64 {
    24 * 60
}

fn default_state_ttl_minutes() -> i64 {
    10
}

fn default_secure_cookies() -> bool {
    true
}

fn default_jwks_refresh_interval_seconds() -> u64 {
    3600
}

fn default_cors_max_age_seconds() -> u64 {
    600
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_session_ttl_minutes(),
            state_ttl_minutes: default_state_ttl_minutes(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ttl_minutes)
    }

    #[must_use]
    pub fn state_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.state_ttl_minutes)
    }

    /// Returns the session and state lifetimes used as store TTLs.
    ///
    /// # Errors
    ///
    /// Returns the offending key if either lifetime is not positive.
    pub fn store_ttls(&self) -> Result<(Duration, Duration), String> {
        Ok((
            positive_minutes("SESSION__TTL_MINUTES", self.ttl_minutes)?,
            positive_minutes("SESSION__STATE_TTL_MINUTES", self.state_ttl_minutes)?,
        ))
    }
}

fn positive_minutes(key: &str, minutes: i64) -> Result<Duration, String> {
    match u64::try_from(minutes) {
        Ok(minutes) if minutes > 0 => Ok(Duration::from_secs(minutes * 60)),
        _ => Err(format!("{key} must be positive, got {minutes}")),
    }
}

impl RedisConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl JwtConfig {
    /// Returns the accepted client ids.
    #[must_use]
    pub fn client_ids(&self) -> Vec<String> {
        split_list(&self.client_ids)
    }

    /// Returns the JWKS URL, derived from the issuer when not configured.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        match &self.jwks_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!(
                "{}/.well-known/jwks.json",
                self.issuer.trim_end_matches('/')
            ),
        }
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

impl CorsConfig {
    #[must_use]
    pub fn allow_origins(&self) -> Vec<String> {
        split_list(&self.allow_origins)
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
