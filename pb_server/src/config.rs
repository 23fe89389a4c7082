//! Runtime settings for the server binary.
//!
//! Command-line values win over the environment; everything else comes from
//! `SERVER_BIND`, `METRICS_BIND`, the `DB_*` pool variables and the generation
//! tuning variables.

use pool_bracket::{GenerationConfig, db::DatabaseConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

const DEFAULT_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 6970);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Prometheus scrape address; metrics are disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    pub database: DatabaseConfig,
    /// Lock timeout and standings retry settings
    pub generation: GenerationConfig,
}

impl ServerConfig {
    /// Merge CLI overrides with the environment
    ///
    /// Fails only when an address variable is set to something unparseable.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        metrics_override: Option<SocketAddr>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .map(Ok)
            .unwrap_or_else(|| parse_addr_env("SERVER_BIND").map(|a| a.unwrap_or(DEFAULT_BIND)))?;
        let metrics_bind = match metrics_override {
            Some(addr) => Some(addr),
            None => parse_addr_env("METRICS_BIND")?,
        };

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        Ok(Self {
            bind,
            metrics_bind,
            database,
            generation: GenerationConfig::from_env(),
        })
    }

    /// Reject combinations the generation runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.lock_timeout < Duration::from_secs(1) {
            return Err(invalid("GENERATION_LOCK_TIMEOUT_SECS", "below one second"));
        }
        if self.generation.standings_retry_attempts == 0 {
            return Err(invalid("STANDINGS_RETRY_ATTEMPTS", "zero attempts"));
        }
        let db = &self.database;
        if db.min_connections > db.max_connections {
            return Err(invalid(
                "DB_MIN_CONNECTIONS",
                format!("{} exceeds DB_MAX_CONNECTIONS {}", db.min_connections, db.max_connections),
            ));
        }
        if self.metrics_bind == Some(self.bind) {
            return Err(invalid(
                "METRICS_BIND",
                format!("collides with the API listener on {}", self.bind),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: String, reason: String },
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        reason: reason.into(),
    }
}

fn parse_addr_env(key: &str) -> Result<Option<SocketAddr>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| invalid(key, format!("{value:?} is not a socket address: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:8080".parse().unwrap(),
            metrics_bind: None,
            database: DatabaseConfig::development(),
            generation: GenerationConfig::default(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut config = config();
        config.generation.standings_retry_attempts = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("STANDINGS_RETRY_ATTEMPTS"));
    }

    #[test]
    fn test_metrics_must_not_share_bind() {
        let mut config = config();
        config.metrics_bind = Some(config.bind);
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }

    #[test]
    fn test_overrides_win() {
        let bind: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let config = ServerConfig::from_env(
            Some(bind),
            Some("postgres://example/db".to_string()),
            None,
        )
        .unwrap();

        assert_eq!(config.bind, bind);
        assert_eq!(config.database.database_url, "postgres://example/db");
    }
}
