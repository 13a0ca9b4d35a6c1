//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Where failed wizard requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPaths {
    pub login: String,
    pub catalog: String,
    pub installed: String,
    /// Prefix of the wizard itself; steps are appended as path segments.
    pub installation: String,
}

impl Default for RedirectPaths {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            catalog: "/apps".to_string(),
            installed: "/apps/installed".to_string(),
            installation: "/apps/installation".to_string(),
        }
    }
}

/// Service configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Shared secret expected in the calendar webhook's channel token.
    /// `None` rejects every notification.
    pub webhook_token: Option<SecretString>,
    /// Header carrying the authenticated user id, set by the upstream proxy.
    pub session_header: String,
    pub redirects: RedirectPaths,
    /// How long a refreshed availability window stays cached.
    pub cache_ttl: Duration,
    /// Request timeout for calendar provider calls.
    pub provider_timeout: Duration,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/install-flow.db"),
            webhook_token: None,
            session_header: "x-user-id".to_string(),
            redirects: RedirectPaths::default(),
            cache_ttl: Duration::from_secs(30 * 24 * 3600), // 30 days
            provider_timeout: Duration::from_secs(10),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("INSTALL_FLOW_PORT") {
            Some(v) => parse_value("INSTALL_FLOW_PORT", &v)?,
            None => defaults.port,
        };

        let cache_ttl = match get("INSTALL_FLOW_CACHE_TTL_DAYS") {
            Some(v) => {
                let days: u64 = parse_value("INSTALL_FLOW_CACHE_TTL_DAYS", &v)?;
                Duration::from_secs(days * 24 * 3600)
            }
            None => defaults.cache_ttl,
        };

        let provider_timeout = match get("INSTALL_FLOW_PROVIDER_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_value("INSTALL_FLOW_PROVIDER_TIMEOUT_SECS", &v)?),
            None => defaults.provider_timeout,
        };

        let redirects = RedirectPaths {
            login: get("INSTALL_FLOW_LOGIN_PATH").unwrap_or(defaults.redirects.login),
            catalog: get("INSTALL_FLOW_CATALOG_PATH").unwrap_or(defaults.redirects.catalog),
            installed: get("INSTALL_FLOW_INSTALLED_PATH").unwrap_or(defaults.redirects.installed),
            installation: get("INSTALL_FLOW_INSTALLATION_PATH")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.redirects.installation),
        };

        Ok(Self {
            port,
            db_path: get("INSTALL_FLOW_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            webhook_token: get("GOOGLE_WEBHOOK_TOKEN").map(SecretString::from),
            session_header: get("INSTALL_FLOW_SESSION_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.session_header),
            redirects,
            cache_ttl,
            provider_timeout,
            log_level: get("INSTALL_FLOW_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_dir: get("INSTALL_FLOW_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value:?}: {e}"),
        })
}
