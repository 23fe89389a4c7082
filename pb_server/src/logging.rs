//! Structured logging configuration.
//!
//! The engine logs through the `log` facade; `init` installs a tracing
//! subscriber that also receives those records, so engine and server events
//! share one output.

use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const SLOW_OPERATION_MS: u64 = 1000;

/// Install the global subscriber; `RUST_LOG` overrides `info,sqlx=warn`
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true);

    // `try_init` also bridges `log` records into the subscriber
    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        eprintln!("Logging already initialized: {e}");
        return;
    }

    tracing::info!("Structured logging initialized");
}

/// One line per generation run; `outcome` is `"ok"` or the error kind
pub fn log_generation_event(operation: &str, division: &str, outcome: &str, elapsed: Duration) {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if outcome == "ok" {
        tracing::info!(operation, division, elapsed_ms, "Generation finished");
    } else {
        tracing::warn!(operation, division, outcome, elapsed_ms, "Generation rejected");
    }
    log_performance(operation, elapsed_ms, Some(division));
}

/// Timing line for an operation, promoted to warn past [`SLOW_OPERATION_MS`]
///
/// ```
/// use pb_server::logging::log_performance;
///
/// log_performance("bracket_from_standings", 42, Some("spring-open/mixed"));
/// ```
pub fn log_performance(operation: &str, duration_ms: u64, metadata: Option<&str>) {
    if duration_ms > SLOW_OPERATION_MS {
        tracing::warn!(operation, duration_ms, metadata, "Slow operation");
    } else {
        tracing::debug!(operation, duration_ms, metadata, "Operation timing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_generation_event() {
        log_generation_event("pool_schedule", "t/d", "ok", Duration::from_millis(12));
        log_generation_event("bracket_from_seeds", "t/d", "conflict", Duration::from_secs(2));
    }

    #[test]
    fn test_log_performance() {
        log_performance("standings", 5, Some("t/d"));
        log_performance("bracket_from_standings", SLOW_OPERATION_MS + 1, None);
    }
}
