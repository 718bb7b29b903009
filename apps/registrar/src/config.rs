//! # Server Configuration
//!
//! Settings for `registrar serve`. Values come from command-line flags, then
//! `REGISTRAR_*` environment variables, then the defaults below.

use registrar_core::BackendKind;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default database file.
pub const DEFAULT_DATABASE: &str = "registrar.redb";

/// Default requests per second before 429.
pub const DEFAULT_RATE_LIMIT: u32 = 50;

/// Default number of cached bearer tokens.
pub const DEFAULT_TOKEN_CACHE_SIZE: usize = 1024;

/// Runtime settings of the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub bind: String,
    /// Database file (ignored by the memory backend).
    pub database: PathBuf,
    /// Storage backend.
    pub backend: BackendKind,
    /// Requests per second allowed across all clients.
    pub rate_limit_per_second: u32,
    /// Allowed CORS origin. `None` disables CORS, `"*"` allows any.
    pub cors_allow_origin: Option<String>,
    /// Token cache capacity.
    pub token_cache_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            database: PathBuf::from(DEFAULT_DATABASE),
            backend: BackendKind::Redb,
            rate_limit_per_second: DEFAULT_RATE_LIMIT,
            cors_allow_origin: None,
            token_cache_size: DEFAULT_TOKEN_CACHE_SIZE,
        }
    }
}

/// Explicit values from the command line. `None` falls back to the
/// environment, then to the default.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--bind`
    pub bind: Option<String>,
    /// `--database`
    pub database: Option<PathBuf>,
    /// `--backend`
    pub backend: Option<BackendKind>,
    /// `--rate-limit`
    pub rate_limit_per_second: Option<u32>,
    /// `--cors-origin`
    pub cors_allow_origin: Option<String>,
    /// `--token-cache-size`
    pub token_cache_size: Option<usize>,
}

impl ServerConfig {
    /// Resolve the configuration from flags and the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, String> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with a custom environment lookup.
    pub fn resolve_with(
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let defaults = Self::default();

        let rate_limit_per_second = match overrides.rate_limit_per_second {
            Some(limit) => limit,
            None => match env("REGISTRAR_RATE_LIMIT") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("REGISTRAR_RATE_LIMIT is not a number: '{raw}'"))?,
                None => defaults.rate_limit_per_second,
            },
        };

        let config = Self {
            bind: overrides
                .bind
                .or_else(|| env("REGISTRAR_BIND"))
                .unwrap_or(defaults.bind),
            database: overrides
                .database
                .or_else(|| env("REGISTRAR_DATABASE").map(PathBuf::from))
                .unwrap_or(defaults.database),
            backend: overrides.backend.unwrap_or(defaults.backend),
            rate_limit_per_second,
            cors_allow_origin: overrides.cors_allow_origin.or(defaults.cors_allow_origin),
            token_cache_size: overrides
                .token_cache_size
                .unwrap_or(defaults.token_cache_size),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        self.socket_addr()?;
        if self.rate_limit_per_second == 0 {
            return Err("rate limit must be at least 1 request per second".to_string());
        }
        if self.token_cache_size == 0 {
            return Err("token cache size must be at least 1".to_string());
        }
        Ok(())
    }

    /// Parsed listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        self.bind
            .parse()
            .map_err(|e| format!("invalid bind address '{}': {e}", self.bind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::resolve_with(ConfigOverrides::default(), no_env);
        assert_eq!(config, Ok(ServerConfig::default()));
    }

    #[test]
    fn flags_beat_environment() {
        let env = |key: &str| match key {
            "REGISTRAR_BIND" => Some("0.0.0.0:9000".to_string()),
            "REGISTRAR_RATE_LIMIT" => Some("7".to_string()),
            _ => None,
        };
        let overrides = ConfigOverrides {
            bind: Some("127.0.0.1:7000".into()),
            ..ConfigOverrides::default()
        };
        let config = ServerConfig::resolve_with(overrides, env).unwrap_or_default();
        assert_eq!(config.bind, "127.0.0.1:7000");
        assert_eq!(config.rate_limit_per_second, 7);
    }

    #[test]
    fn rejects_bad_values() {
        let zero = ConfigOverrides {
            rate_limit_per_second: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(ServerConfig::resolve_with(zero, no_env).is_err());

        let bad_bind = ConfigOverrides {
            bind: Some("localhost".into()),
            ..ConfigOverrides::default()
        };
        assert!(ServerConfig::resolve_with(bad_bind, no_env).is_err());

        let env = |_: &str| Some("fast".to_string());
        assert!(ServerConfig::resolve_with(ConfigOverrides::default(), env).is_err());
    }
}
