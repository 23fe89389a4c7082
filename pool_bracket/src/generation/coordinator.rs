//! Generation coordinator: runs each organizer trigger as a locked, idempotent
//! operation against the division store.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::config::GenerationConfig;
use super::errors::{GenerationError, GenerationResult};
use super::lock::{Clock, LockFamily, SystemClock};
use crate::bracket::{
    BracketError, BracketMatchGenerator, BracketSeeder, QualifierSelector,
    ensure_pool_stage_complete,
};
use crate::db::{DivisionStore, LockAttempt, WriteBatch};
use crate::division::{
    BracketType, DefaultIdStrategy, DivisionKey, DivisionRecord, IdStrategy, Match, MatchId,
    PoolStandings, ResultKind, SeedDocument, Stage,
};
use crate::schedule::{PoolScheduleBuilder, validate_assignment};
use crate::standings::StandingsCalculator;

/// Organizer trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationOperation {
    PoolSchedule,
    BracketFromStandings,
    BracketFromSeeds,
}

impl GenerationOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationOperation::PoolSchedule => "pool_schedule",
            GenerationOperation::BracketFromStandings => "bracket_from_standings",
            GenerationOperation::BracketFromSeeds => "bracket_from_seeds",
        }
    }

    pub fn family(&self) -> LockFamily {
        match self {
            GenerationOperation::PoolSchedule => LockFamily::PoolSchedule,
            GenerationOperation::BracketFromStandings | GenerationOperation::BracketFromSeeds => {
                LockFamily::Bracket
            }
        }
    }
}

impl fmt::Display for GenerationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a successful generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: Uuid,
    pub operation: GenerationOperation,
    pub division: DivisionKey,
    pub matches_written: usize,
    /// Stale matches deleted because the new generation no longer produces them
    pub matches_removed: usize,
    /// Seed document ids written
    pub seed_documents: Vec<MatchId>,
    /// Lock version after release; `None` if the lock was lost to a takeover
    pub lock_version: Option<u64>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct WriteSummary {
    matches_written: usize,
    matches_removed: usize,
    seed_documents: Vec<MatchId>,
}

pub struct GenerationCoordinator {
    store: Arc<dyn DivisionStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdStrategy>,
    config: GenerationConfig,
}

impl GenerationCoordinator {
    pub fn new(store: Arc<dyn DivisionStore>, config: GenerationConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ids: Arc::new(DefaultIdStrategy),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_strategy(mut self, ids: Arc<dyn IdStrategy>) -> Self {
        self.ids = ids;
        self
    }

    pub fn store(&self) -> &Arc<dyn DivisionStore> {
        &self.store
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate (or regenerate) the round-robin schedule of every pool.
    ///
    /// Regeneration overwrites matches with the same canonical ids and removes
    /// pool matches the current assignment no longer produces.
    ///
    /// # Errors
    ///
    /// * `GenerationError::Bracket` - Invalid pool assignment
    /// * `GenerationError::PoolScheduleHasResults` - Existing pool matches carry results
    /// * `GenerationError::InProgress` - Another run holds the pool schedule lock
    pub async fn generate_pool_schedule(
        &self,
        division: &DivisionKey,
    ) -> GenerationResult<GenerationReport> {
        let record = self.load_record(division).await?;
        let pools = self.store.load_pools(division).await?;
        validate_assignment(&pools)?;

        self.run_locked(division, GenerationOperation::PoolSchedule, async {
            let existing = self.store.load_matches(division, Some(Stage::Pool)).await?;
            let blocking = ids_with_results(existing.iter());
            if !blocking.is_empty() {
                return Err(GenerationError::PoolScheduleHasResults { blocking });
            }

            let matches = PoolScheduleBuilder::new(self.ids.as_ref(), record.config.scoring.pool)
                .build(division, &pools)?;

            let mut batch = WriteBatch::new();
            let removed = stale_ids(&existing, &matches);
            let summary = WriteSummary {
                matches_written: matches.len(),
                matches_removed: removed.len(),
                seed_documents: Vec::new(),
            };
            batch.put_matches(matches);
            for id in removed {
                batch.delete_match(id);
            }

            self.store.commit(division, batch).await?;
            Ok(summary)
        })
        .await
    }

    /// Compute pool standings, select qualifiers, seed and generate the main
    /// bracket (and the plate bracket when enabled).
    ///
    /// Every pairing of the current pool assignment must be stored with a
    /// finalized result; pool matches left over from an earlier assignment
    /// are ignored. With plate disabled, a previously generated plate bracket
    /// and its seed document are removed.
    ///
    /// # Errors
    ///
    /// * `GenerationError::PoolStageIncomplete` - Unscheduled pairings or pool matches without a finalized result
    /// * `GenerationError::BracketAlreadyStarted` - Bracket matches already carry results
    /// * `GenerationError::Bracket` - Unsupported advancement or too few qualifiers
    /// * `GenerationError::InProgress` - Another run holds the bracket lock
    pub async fn generate_bracket_from_standings(
        &self,
        division: &DivisionKey,
    ) -> GenerationResult<GenerationReport> {
        let record = self.load_record(division).await?;
        let pools = self.store.load_pools(division).await?;
        if pools.is_empty() {
            return Err(BracketError::EmptyPoolAssignment.into());
        }
        record.config.advancement.max_seed_rank()?;

        let expected: Vec<MatchId> =
            PoolScheduleBuilder::new(self.ids.as_ref(), record.config.scoring.pool)
                .build(division, &pools)?
                .into_iter()
                .map(|m| m.id)
                .collect();
        ensure_pool_stage_complete(
            &expected,
            &self.store.load_matches(division, Some(Stage::Pool)).await?,
        )?;

        self.run_locked(division, GenerationOperation::BracketFromStandings, async {
            // Re-check under the lock; results may have changed since the fast check
            let stored = self.store.load_matches(division, Some(Stage::Pool)).await?;
            ensure_pool_stage_complete(&expected, &stored)?;

            let wanted: HashSet<&str> = expected.iter().map(String::as_str).collect();
            let pool_matches: Vec<Match> = stored
                .into_iter()
                .filter(|m| wanted.contains(m.id.as_str()))
                .collect();

            let calculator = StandingsCalculator::new(record.config.tiebreakers.clone());
            let standings: Vec<PoolStandings> = pools
                .iter()
                .map(|pool| calculator.compute(pool, &pool_matches))
                .collect();

            let outcome =
                QualifierSelector::new(record.config.advancement, record.config.plate_enabled)
                    .select(&pool_matches, &standings)?;

            let seeder = BracketSeeder::new(self.ids.as_ref(), division);
            let mut documents = vec![seeder.seed_main(&outcome)?];
            if record.config.plate_enabled {
                documents.push(seeder.seed_plate(&outcome)?);
            }

            for standing in &standings {
                if let Err(e) = self.store.save_standings(division, standing).await {
                    log::warn!(
                        "Could not store standings for {} pool {}: {}",
                        division,
                        standing.pool_key,
                        e
                    );
                }
            }

            let retired = (!record.config.plate_enabled).then_some(BracketType::Plate);
            self.write_brackets(division, &record, documents, retired)
                .await
        })
        .await
    }

    /// Regenerate one bracket's matches from its stored seed document.
    ///
    /// # Errors
    ///
    /// * `GenerationError::SeedDocumentMissing` - Bracket was never seeded
    /// * `GenerationError::BracketAlreadyStarted` - Bracket matches already carry results
    /// * `GenerationError::InProgress` - Another run holds the bracket lock
    pub async fn generate_bracket_from_seeds(
        &self,
        division: &DivisionKey,
        bracket_type: BracketType,
    ) -> GenerationResult<GenerationReport> {
        let record = self.load_record(division).await?;

        self.run_locked(division, GenerationOperation::BracketFromSeeds, async {
            let document = self
                .store
                .load_seed_document(division, bracket_type)
                .await?
                .ok_or(GenerationError::SeedDocumentMissing(bracket_type))?;

            self.write_brackets(division, &record, vec![document], None)
                .await
        })
        .await
    }

    async fn load_record(&self, division: &DivisionKey) -> GenerationResult<DivisionRecord> {
        self.store
            .load_division(division)
            .await?
            .ok_or_else(|| GenerationError::DivisionNotFound(division.clone()))
    }

    /// Generate matches for every document and commit them, the documents and
    /// the removal of stale matches in one batch.
    ///
    /// `retired` names a bracket that is no longer configured; its matches and
    /// seed document are deleted in the same batch.
    async fn write_brackets(
        &self,
        division: &DivisionKey,
        record: &DivisionRecord,
        documents: Vec<SeedDocument>,
        retired: Option<BracketType>,
    ) -> GenerationResult<WriteSummary> {
        let existing = self.store.load_matches(division, Some(Stage::Bracket)).await?;

        let touched = documents
            .iter()
            .map(|d| d.bracket_type)
            .chain(retired);
        for bracket_type in touched {
            let blocking = ids_with_results(
                existing
                    .iter()
                    .filter(|m| m.bracket_type == Some(bracket_type)),
            );
            if !blocking.is_empty() {
                return Err(GenerationError::BracketAlreadyStarted {
                    bracket_type,
                    blocking,
                });
            }
        }

        let generator = BracketMatchGenerator::new(
            self.ids.as_ref(),
            &record.config.scoring,
            record.config.bronze_match,
        );

        let mut batch = WriteBatch::new();
        let mut summary = WriteSummary::default();

        for document in documents {
            let matches = generator.generate(division, &document)?;
            let previous: Vec<Match> = existing
                .iter()
                .filter(|m| m.bracket_type == Some(document.bracket_type))
                .cloned()
                .collect();

            let removed = stale_ids(&previous, &matches);
            summary.matches_written += matches.len();
            summary.matches_removed += removed.len();
            summary.seed_documents.push(document.id.clone());

            log::debug!(
                "{} {} bracket: size {}, {} bye(s), {} match(es)",
                division,
                document.bracket_type,
                document.bracket_size,
                document.bye_count,
                matches.len()
            );

            batch.put_matches(matches);
            for id in removed {
                batch.delete_match(id);
            }
            batch.put_seed_document(document);
        }

        if let Some(bracket_type) = retired {
            let leftovers: Vec<MatchId> = existing
                .iter()
                .filter(|m| m.bracket_type == Some(bracket_type))
                .map(|m| m.id.clone())
                .collect();
            let had_document = self
                .store
                .load_seed_document(division, bracket_type)
                .await?
                .is_some();

            if had_document || !leftovers.is_empty() {
                log::info!(
                    "{} {} bracket disabled: removing {} match(es) and its seed document",
                    division,
                    bracket_type,
                    leftovers.len()
                );
                summary.matches_removed += leftovers.len();
                for id in leftovers {
                    batch.delete_match(id);
                }
                batch.delete_seed_document(bracket_type);
            }
        }

        self.store.commit(division, batch).await?;
        Ok(summary)
    }

    /// Acquire the operation's lock, run `body`, and release the lock on both
    /// success and failure.
    async fn run_locked<F>(
        &self,
        division: &DivisionKey,
        operation: GenerationOperation,
        body: F,
    ) -> GenerationResult<GenerationReport>
    where
        F: Future<Output = GenerationResult<WriteSummary>>,
    {
        let family = operation.family();
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        let attempt = self
            .store
            .try_acquire_lock(
                division,
                family,
                run_id,
                self.clock.now(),
                self.config.lock_timeout,
            )
            .await?;

        if let LockAttempt::Busy(conflict) = attempt {
            log::warn!(
                "{} for {} rejected: lock held by {:?} since {:?}",
                operation,
                division,
                conflict.holder,
                conflict.held_since
            );
            return Err(GenerationError::InProgress {
                division: division.clone(),
                family,
                retry_after_secs: conflict.retry_after.as_secs().max(1),
            });
        }

        log::info!("{} for {} started (run {})", operation, division, run_id);

        let outcome = body.await;
        let released = self
            .store
            .release_lock(division, family, run_id, self.clock.now(), outcome.is_ok())
            .await;

        let lock_version = match released {
            Ok(Some(lock)) => Some(lock.version),
            Ok(None) => {
                log::warn!(
                    "{} for {} lost its lock to a stale takeover (run {})",
                    operation,
                    division,
                    run_id
                );
                None
            }
            Err(e) => {
                log::error!(
                    "Failed to release {} lock for {} (run {}): {}",
                    family,
                    division,
                    run_id,
                    e
                );
                if outcome.is_ok() {
                    return Err(e.into());
                }
                None
            }
        };

        let summary = match outcome {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!("{} for {} failed (run {}): {}", operation, division, run_id, e);
                return Err(e);
            }
        };

        let report = GenerationReport {
            run_id,
            operation,
            division: division.clone(),
            matches_written: summary.matches_written,
            matches_removed: summary.matches_removed,
            seed_documents: summary.seed_documents,
            lock_version,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        log::info!(
            "{} for {} finished: {} written, {} removed, lock version {:?}",
            operation,
            division,
            report.matches_written,
            report.matches_removed,
            report.lock_version
        );
        Ok(report)
    }
}

/// Ids of matches carrying a result other than a BYE, sorted
fn ids_with_results<'m>(matches: impl Iterator<Item = &'m Match>) -> Vec<MatchId> {
    let mut ids: Vec<MatchId> = matches
        .filter(|m| m.result.as_ref().is_some_and(|r| r.kind != ResultKind::Bye))
        .map(|m| m.id.clone())
        .collect();
    ids.sort();
    ids
}

/// Ids in `previous` that `current` no longer produces
fn stale_ids(previous: &[Match], current: &[Match]) -> Vec<MatchId> {
    let produced: HashSet<&str> = current.iter().map(|m| m.id.as_str()).collect();
    previous
        .iter()
        .filter(|m| !produced.contains(m.id.as_str()))
        .map(|m| m.id.clone())
        .collect()
}
