//! Standings projection: recomputes a pool's stored standings after a
//! completion, decoupled from the completion write.
//!
//! A refresh never returns an error. Failures are retried per the
//! [`RetryPolicy`], logged, and reported as [`ProjectionOutcome::Failed`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::calculator::{
    StandingsCalculator, latest_watermark, needs_recompute, results_fingerprint,
};
use crate::db::{DivisionStore, StoreError, StoreResult};
use crate::division::{DivisionKey, Stage};

/// Fixed-backoff retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first; 0 is treated as 1
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// Single attempt, no backoff
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Result of one projection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProjectionOutcome {
    /// Standings recomputed and stored
    Updated { watermark: Option<DateTime<Utc>> },
    /// Stored standings already reflect the current results
    Skipped { watermark: Option<DateTime<Utc>> },
    /// Every attempt failed; the completion itself is unaffected
    Failed { attempts: u32, error: String },
}

impl ProjectionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProjectionOutcome::Failed { .. })
    }
}

#[derive(Clone)]
pub struct StandingsProjector {
    store: Arc<dyn DivisionStore>,
    retry: RetryPolicy,
}

impl StandingsProjector {
    pub fn new(store: Arc<dyn DivisionStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Bring stored standings of `pool_key` up to date.
    pub async fn refresh(&self, division: &DivisionKey, pool_key: &str) -> ProjectionOutcome {
        let attempts = self.retry.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.try_refresh(division, pool_key).await {
                Ok(outcome) => return outcome,
                Err(e) => {
                    log::warn!(
                        "Standings refresh for {} pool {} failed (attempt {}/{}): {}",
                        division,
                        pool_key,
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }

        log::error!(
            "Giving up on standings refresh for {} pool {} after {} attempt(s): {}",
            division,
            pool_key,
            attempts,
            last_error
        );
        ProjectionOutcome::Failed {
            attempts,
            error: last_error,
        }
    }

    async fn try_refresh(
        &self,
        division: &DivisionKey,
        pool_key: &str,
    ) -> StoreResult<ProjectionOutcome> {
        let record = self
            .store
            .load_division(division)
            .await?
            .ok_or_else(|| StoreError::DivisionNotFound(division.clone()))?;

        let pools = self.store.load_pools(division).await?;
        let pool = pools.iter().find(|p| p.key == pool_key).ok_or_else(|| {
            StoreError::Corrupt(
                format!("{division}/pool/{pool_key}"),
                "pool is not part of the assignment".to_string(),
            )
        })?;

        let matches: Vec<_> = self
            .store
            .load_matches(division, Some(Stage::Pool))
            .await?
            .into_iter()
            .filter(|m| m.pool_key.as_deref() == Some(pool_key))
            .collect();

        let latest = latest_watermark(pool, &matches);
        let fingerprint = results_fingerprint(pool, &matches);
        let stored = self.store.load_standings(division, pool_key).await?;

        if !needs_recompute(stored.as_ref(), latest, &fingerprint) {
            log::debug!(
                "Standings for {} pool {} already current, skipping",
                division,
                pool_key
            );
            return Ok(ProjectionOutcome::Skipped { watermark: latest });
        }

        let standings =
            StandingsCalculator::new(record.config.tiebreakers.clone()).compute(pool, &matches);
        self.store.save_standings(division, &standings).await?;

        log::info!(
            "Recomputed standings for {} pool {} ({} rows)",
            division,
            pool_key,
            standings.rows.len()
        );
        Ok(ProjectionOutcome::Updated {
            watermark: standings.watermark,
        })
    }
}
