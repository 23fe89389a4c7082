//! Generation runtime configuration.

use std::env;
use std::time::Duration;

use crate::standings::RetryPolicy;

/// Generation configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Age after which a `generating` lock may be taken over
    pub lock_timeout: Duration,

    /// Attempts per standings refresh
    pub standings_retry_attempts: u32,

    /// Pause between standings refresh attempts
    pub standings_retry_backoff: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(120),
            standings_retry_attempts: 3,
            standings_retry_backoff: Duration::from_millis(250),
        }
    }
}

impl GenerationConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `GENERATION_LOCK_TIMEOUT_SECS`: Stale lock timeout (default: 120)
    /// - `STANDINGS_RETRY_ATTEMPTS`: Standings refresh attempts (default: 3)
    /// - `STANDINGS_RETRY_BACKOFF_MS`: Backoff between attempts (default: 250)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let lock_timeout_secs: u64 = env::var("GENERATION_LOCK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.lock_timeout.as_secs());

        let standings_retry_attempts: u32 = env::var("STANDINGS_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.standings_retry_attempts);

        let backoff_ms: u64 = env::var("STANDINGS_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(250);

        Self {
            lock_timeout: Duration::from_secs(lock_timeout_secs),
            standings_retry_attempts,
            standings_retry_backoff: Duration::from_millis(backoff_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.standings_retry_attempts, self.standings_retry_backoff)
    }
}
