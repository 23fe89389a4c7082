//! Pool-to-bracket scheduling server.
//!
//! Serves division setup, generation triggers and result submission over
//! HTTP, backed by PostgreSQL (or an in-memory store with `--memory`).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use pb_server::{
    api,
    config::ServerConfig,
    logging, metrics,
};
use pico_args::Arguments;
use pool_bracket::{DivisionStore, MemoryDivisionStore, db::Database};
use tracing::info;

const HELP: &str = "\
Run the pool-to-bracket scheduling server

USAGE:
  pb_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6970]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/pool_bracket]
  --metrics    IP:PORT     Prometheus scrape address   [default: env METRICS_BIND, disabled if unset]

FLAGS:
  --memory                 Keep divisions in memory instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND                    Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL                   PostgreSQL connection string
  METRICS_BIND                   Prometheus scrape address
  GENERATION_LOCK_TIMEOUT_SECS   Age after which a generation lock is stale
  STANDINGS_RETRY_ATTEMPTS       Standings refresh attempts after a result
  RUST_LOG                       Log filter (default: info,sqlx=warn)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    metrics: Option<SocketAddr>,
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        metrics: pargs.opt_value_from_str("--metrics")?,
        memory: pargs.contains("--memory"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        anyhow::bail!("Unexpected arguments: {:?}\n\n{HELP}", remaining);
    }

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.metrics)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics available at http://{}/metrics", addr);
    }

    let (state, database) = if args.memory {
        info!("Using in-memory division store; data is lost on exit");
        let store: Arc<dyn DivisionStore> = Arc::new(MemoryDivisionStore::new());
        (api::AppState::new(store, config.generation.clone()), None)
    } else {
        info!("Connecting to database");
        let database = Database::new(&config.database)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
        database
            .migrate()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to apply schema: {}", e))?;
        info!("Database schema ready");

        let store: Arc<dyn DivisionStore> = Arc::new(database.division_store());
        let state = api::AppState::new(store, config.generation.clone()).with_database(database.clone());
        (state, Some(database))
    };

    info!(
        "Generation lock timeout {}s, standings retries {}",
        config.generation.lock_timeout.as_secs(),
        config.generation.standings_retry_attempts
    );

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    if let Some(database) = database {
        database.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
