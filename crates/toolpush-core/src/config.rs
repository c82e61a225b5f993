//! Client configuration, resolved from the environment.

use std::env;
use std::time::Duration;

/// Environment variable naming the backend base URL.
pub const ENV_API_URL: &str = "TOOLPUSH_API_URL";
/// Environment variable naming the auth service URL.
pub const ENV_AUTH_URL: &str = "TOOLPUSH_AUTH_URL";
/// Environment variable carrying the auth service public (anon) key.
pub const ENV_AUTH_ANON_KEY: &str = "TOOLPUSH_AUTH_ANON_KEY";

/// Default backend base URL when `TOOLPUSH_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Runtime configuration for the client stack.
///
/// Metadata calls (history listing, appends, deletes) use the short
/// `request_timeout`; assistant generation uses the longer
/// `generate_timeout`. Timeouts map to `ApiError::Network` when exceeded.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the chat backend.
    pub api_url: String,
    /// URL of the external auth collaborator, if configured.
    pub auth_url: Option<String>,
    /// Public key for the auth collaborator, if configured.
    pub auth_anon_key: Option<String>,
    /// Timeout for metadata calls.
    pub request_timeout: Duration,
    /// Timeout for assistant generation calls.
    pub generate_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_url: None,
            auth_anon_key: None,
            request_timeout: Duration::from_secs(10),
            generate_timeout: Duration::from_secs(120),
        }
    }
}

impl Config {
    /// Resolves configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env::var(ENV_API_URL).ok().filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        config.auth_url = env::var(ENV_AUTH_URL).ok().filter(|v| !v.trim().is_empty());
        config.auth_anon_key = env::var(ENV_AUTH_ANON_KEY)
            .ok()
            .filter(|v| !v.trim().is_empty());
        config
    }

    /// Overrides the backend base URL, trimming any trailing slash.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        let url: String = api_url.into();
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }
}
