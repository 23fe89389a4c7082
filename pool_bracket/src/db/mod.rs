//! Persistence: the division store contract, its PostgreSQL and in-memory
//! implementations, and connection pooling.

use sqlx::postgres::PgPool;

pub mod config;
pub mod errors;
pub mod memory;
pub mod repository;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryDivisionStore;
pub use repository::{
    DivisionStore, LockAttempt, MatchPatch, PgDivisionStore, WriteBatch, schedule_order,
};

const SCHEMA: &str = include_str!("../../migrations/001_division_documents.sql");

/// Shared PostgreSQL handle for the division tables
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect using the pool limits in `config`
    ///
    /// ```no_run
    /// use pool_bracket::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let db = Database::new(&DatabaseConfig::from_env()).await?;
    ///     db.migrate().await?;
    ///     let _store = db.division_store();
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = config.pool_options().connect(&config.database_url).await?;
        Ok(Self { pool })
    }

    /// Apply the division schema; every statement is `IF NOT EXISTS`
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn division_store(&self) -> PgDivisionStore {
        PgDivisionStore::new(self.pool.clone())
    }

    /// Round-trip a trivial query; used by `/health`
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(drop)
    }

    /// Drain and close all pooled connections
    pub async fn close(self) {
        self.pool.close().await;
    }
}
