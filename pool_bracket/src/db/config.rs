//! Connection pool settings.

use sqlx::postgres::PgPoolOptions;
use std::env;
use std::time::Duration;

/// Pool limits and the target URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a free connection
    pub connection_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Read `DATABASE_URL` and the `DB_*` pool variables
    ///
    /// | variable                | default |
    /// |-------------------------|---------|
    /// | `DB_MAX_CONNECTIONS`    | 10      |
    /// | `DB_MIN_CONNECTIONS`    | 1       |
    /// | `DB_CONNECTION_TIMEOUT` | 10      |
    /// | `DB_IDLE_TIMEOUT`       | 600     |
    /// | `DB_MAX_LIFETIME`       | 1800    |
    ///
    /// A missing or unparseable variable keeps the [`development`](Self::development) value.
    pub fn from_env() -> Self {
        let base = Self::development();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(base.database_url),
            max_connections: env_or("DB_MAX_CONNECTIONS", base.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", base.min_connections),
            connection_timeout_secs: env_or("DB_CONNECTION_TIMEOUT", base.connection_timeout_secs),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT", base.idle_timeout_secs),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME", base.max_lifetime_secs),
        }
    }

    /// Local database `pool_bracket` with a small pool
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/pool_bracket".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }

    pub(crate) fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn env_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    match env::var(name).map(|raw| raw.parse::<T>()) {
        Ok(Ok(value)) => value,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_falls_back_on_garbage() {
        unsafe {
            env::set_var("DB_MAX_CONNECTIONS", "lots");
            env::set_var("DB_MIN_CONNECTIONS", "3");
        }

        let config = DatabaseConfig::from_env();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 3);

        unsafe {
            env::remove_var("DB_MAX_CONNECTIONS");
            env::remove_var("DB_MIN_CONNECTIONS");
        }
    }

    #[test]
    fn test_development_defaults() {
        let config = DatabaseConfig::default();
        assert!(config.database_url.starts_with("postgres://"));
        assert!(config.min_connections <= config.max_connections);
    }
}
