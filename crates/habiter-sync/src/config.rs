#![forbid(unsafe_code)]

//! API endpoint configuration.

use std::time::Duration;

use tracing::warn;

/// Default API root.
pub const DEFAULT_API_URL: &str = "https://habitrpg.com/api/v2/";

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Environment variable overriding [`ApiConfig::base_url`].
pub const API_URL_ENV: &str = "HABITER_API_URL";

/// Environment variable overriding [`ApiConfig::timeout_ms`].
pub const TIMEOUT_ENV: &str = "HABITER_TIMEOUT_MS";

/// Where requests go and how long they may take.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ApiConfig {
    /// API root; request paths are joined onto it.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_owned(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through a custom environment lookup.
    ///
    /// Empty or unparsable values are ignored.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = get_env(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().to_owned();
        }
        if let Some(raw) = get_env(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.timeout_ms = ms,
                _ => warn!(value = %raw, "ignoring invalid {TIMEOUT_ENV}"),
            }
        }
        config
    }

    /// Join `path` onto the base URL with exactly one separating slash.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, DEFAULT_API_URL);
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn builders() {
        let config = ApiConfig::default()
            .with_base_url("http://localhost:3000/api/v2")
            .with_timeout(Duration::from_millis(250));
        assert_eq!(config.base_url, "http://localhost:3000/api/v2");
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn env_overrides() {
        let config = ApiConfig::from_env_with(lookup(&[
            (API_URL_ENV, " http://localhost/api/ "),
            (TIMEOUT_ENV, "1200"),
        ]));
        assert_eq!(config.base_url, "http://localhost/api/");
        assert_eq!(config.timeout_ms, 1200);
    }

    #[test]
    fn bad_env_values_keep_defaults() {
        let config = ApiConfig::from_env_with(lookup(&[(API_URL_ENV, "  "), (TIMEOUT_ENV, "soon")]));
        assert_eq!(config, ApiConfig::default());
        let config = ApiConfig::from_env_with(lookup(&[(TIMEOUT_ENV, "0")]));
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn url_join() {
        let config = ApiConfig::default();
        assert_eq!(config.url_for("user"), "https://habitrpg.com/api/v2/user");
        assert_eq!(config.url_for("/user/tasks"), "https://habitrpg.com/api/v2/user/tasks");
        let bare = ApiConfig::default().with_base_url("http://h/api");
        assert_eq!(bare.url_for("status"), "http://h/api/status");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_fills_missing_fields() {
        let config: ApiConfig = serde_json::from_str(r#"{"timeout_ms": 10}"#).unwrap();
        assert_eq!(config.base_url, DEFAULT_API_URL);
        assert_eq!(config.timeout_ms, 10);
    }
}
