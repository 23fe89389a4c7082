//! Prometheus metrics for generation runs and match completion.
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.
//!
//! ```rust,no_run
//! use pb_server::metrics;
//! use std::net::SocketAddr;
//! use std::time::Duration;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::record_generation("pool_schedule", "ok", Duration::from_millis(40));
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Serve `/metrics` on `addr` and make this exporter the global recorder.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Prometheus exporter on {addr}: {e}"))
}

// ============================================================================
// Generation Metrics
// ============================================================================

/// Record a generation run with its outcome (`ok` or an error kind).
pub fn record_generation(operation: &str, outcome: &str, elapsed: Duration) {
    metrics::counter!("generation_runs_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!("generation_duration_ms",
        "operation" => operation.to_string()
    )
    .record(elapsed.as_secs_f64() * 1000.0);
}

/// Increment the lock conflict counter for a lock family.
pub fn record_lock_conflict(family: &str) {
    metrics::counter!("generation_lock_conflicts_total",
        "family" => family.to_string()
    )
    .increment(1);
}

// ============================================================================
// Completion Metrics
// ============================================================================

/// Record a match completion by resulting status.
pub fn record_completion(status: &str) {
    metrics::counter!("match_completions_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increment the standings projection failure counter.
pub fn record_projection_failure() {
    metrics::counter!("standings_projection_failures_total").increment(1);
}
