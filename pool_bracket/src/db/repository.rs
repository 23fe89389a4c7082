//! Division store contract and its PostgreSQL implementation.
//!
//! Pools, matches, seed documents and standings are documents under a division;
//! the division record carries one generation lock per family.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::cmp::Ordering;
use std::time::Duration;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::timeouts::{DEFAULT_TRANSACTION_TIMEOUT, with_default_timeout, with_long_timeout, with_timeout};
use crate::division::{
    BracketType, DivisionConfig, DivisionKey, DivisionRecord, Match, MatchId, MatchResult,
    MatchSide, MatchStatus, Pool, PoolStandings, SeedDocument, Slot, Stage, compare_pool_labels,
};
use crate::generation::lock::{GenerationLock, LockConflict, LockFamily, LockStatus};

/// Field-level change to a stored match, applied against the row as it is at
/// commit time rather than a copy read earlier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPatch {
    /// Put a participant (or placeholder) into one side
    Seat {
        match_id: MatchId,
        slot: Slot,
        side: MatchSide,
    },
    /// Record a result and the status it implies
    Result {
        match_id: MatchId,
        status: MatchStatus,
        result: MatchResult,
    },
}

impl MatchPatch {
    pub fn match_id(&self) -> &str {
        match self {
            MatchPatch::Seat { match_id, .. } | MatchPatch::Result { match_id, .. } => match_id,
        }
    }

    pub fn apply(&self, m: &mut Match) {
        match self {
            MatchPatch::Seat { slot, side, .. } => *m.side_mut(*slot) = side.clone(),
            MatchPatch::Result { status, result, .. } => {
                m.status = *status;
                m.result = Some(result.clone());
            }
        }
    }
}

/// Documents written together or not at all
///
/// Commit order: seed documents, whole matches, deletions, then patches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub matches: Vec<Match>,
    pub delete_matches: Vec<MatchId>,
    pub seed_documents: Vec<SeedDocument>,
    pub delete_seed_documents: Vec<BracketType>,
    pub patches: Vec<MatchPatch>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_match(&mut self, m: Match) -> &mut Self {
        self.matches.push(m);
        self
    }

    pub fn put_matches(&mut self, matches: impl IntoIterator<Item = Match>) -> &mut Self {
        self.matches.extend(matches);
        self
    }

    pub fn delete_match(&mut self, id: MatchId) -> &mut Self {
        self.delete_matches.push(id);
        self
    }

    pub fn put_seed_document(&mut self, document: SeedDocument) -> &mut Self {
        self.seed_documents.push(document);
        self
    }

    pub fn delete_seed_document(&mut self, bracket_type: BracketType) -> &mut Self {
        self.delete_seed_documents.push(bracket_type);
        self
    }

    /// Patch a stored match; the commit fails if it does not exist
    pub fn patch(&mut self, patch: MatchPatch) -> &mut Self {
        self.patches.push(patch);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of document writes, deletes and patches
    pub fn len(&self) -> usize {
        self.matches.len()
            + self.delete_matches.len()
            + self.seed_documents.len()
            + self.delete_seed_documents.len()
            + self.patches.len()
    }
}

/// Outcome of an acquire attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired(GenerationLock),
    Busy(LockConflict),
}

/// Persistent store used by generation and completion
#[async_trait]
pub trait DivisionStore: Send + Sync {
    /// Load a division record with both locks
    async fn load_division(&self, key: &DivisionKey) -> StoreResult<Option<DivisionRecord>>;

    /// Create or update a division's name and config; lock state is preserved
    async fn save_division(&self, record: &DivisionRecord) -> StoreResult<()>;

    /// Load the participant-to-pool assignment, ordered by pool label
    async fn load_pools(&self, key: &DivisionKey) -> StoreResult<Vec<Pool>>;

    /// Replace the participant-to-pool assignment
    async fn save_pools(&self, key: &DivisionKey, pools: &[Pool]) -> StoreResult<()>;

    /// Load matches, optionally restricted to one stage, in schedule order
    async fn load_matches(&self, key: &DivisionKey, stage: Option<Stage>)
    -> StoreResult<Vec<Match>>;

    /// Load a single match
    async fn load_match(&self, key: &DivisionKey, match_id: &str) -> StoreResult<Option<Match>>;

    /// Load the seed document of a bracket
    async fn load_seed_document(
        &self,
        key: &DivisionKey,
        bracket_type: BracketType,
    ) -> StoreResult<Option<SeedDocument>>;

    /// Load stored standings of one pool
    async fn load_standings(
        &self,
        key: &DivisionKey,
        pool_key: &str,
    ) -> StoreResult<Option<PoolStandings>>;

    /// Store standings of one pool
    async fn save_standings(&self, key: &DivisionKey, standings: &PoolStandings)
    -> StoreResult<()>;

    /// Apply every write, delete and patch of `batch` atomically
    ///
    /// # Errors
    ///
    /// * `StoreError::MissingMatch` - A patch targets a match that does not exist; nothing is written
    async fn commit(&self, key: &DivisionKey, batch: WriteBatch) -> StoreResult<()>;

    /// Atomically read the lock and flip it to `generating` unless it is held
    ///
    /// # Errors
    ///
    /// * `StoreError::DivisionNotFound` - No such division
    async fn try_acquire_lock(
        &self,
        key: &DivisionKey,
        family: LockFamily,
        holder: Uuid,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> StoreResult<LockAttempt>;

    /// Release a lock held by `holder`; returns the new state, or `None` if
    /// `holder` had lost the lock to a stale takeover
    async fn release_lock(
        &self,
        key: &DivisionKey,
        family: LockFamily,
        holder: Uuid,
        now: DateTime<Utc>,
        success: bool,
    ) -> StoreResult<Option<GenerationLock>>;
}

/// Schedule order: pool stage by pool label, round, position; bracket stage by
/// bracket type, round, position, bronze last.
pub fn schedule_order(a: &Match, b: &Match) -> Ordering {
    let stage_rank = |m: &Match| match m.stage {
        Stage::Pool => 0,
        Stage::Bracket => 1,
    };

    stage_rank(a)
        .cmp(&stage_rank(b))
        .then_with(|| {
            compare_pool_labels(
                a.pool_key.as_deref().unwrap_or_default(),
                b.pool_key.as_deref().unwrap_or_default(),
            )
        })
        .then_with(|| a.bracket_type.cmp(&b.bracket_type))
        .then_with(|| a.is_bronze.cmp(&b.is_bronze))
        .then_with(|| a.round.cmp(&b.round))
        .then_with(|| a.position.cmp(&b.position))
        .then_with(|| a.id.cmp(&b.id))
}

const KIND_POOL: &str = "pool";
const KIND_MATCH: &str = "match";
const KIND_SEED: &str = "seed";
const KIND_STANDINGS: &str = "standings";

/// PostgreSQL implementation of [`DivisionStore`]
#[derive(Clone)]
pub struct PgDivisionStore {
    pool: PgPool,
}

impl PgDivisionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn lock_from_row(row: &PgRow) -> StoreResult<GenerationLock> {
        let status: String = row.try_get("status")?;
        let version: i64 = row.try_get("version")?;
        Ok(GenerationLock {
            status: status
                .parse()
                .map_err(|e: String| StoreError::Corrupt("division_locks".to_string(), e))?,
            updated_at: row.try_get("updated_at")?,
            version: u64::try_from(version).unwrap_or_default(),
            holder: row.try_get("holder")?,
        })
    }

    /// Select the lock row `FOR UPDATE` inside `tx`
    async fn locked_row(
        tx: &mut Transaction<'_, Postgres>,
        key: &DivisionKey,
        family: LockFamily,
    ) -> StoreResult<GenerationLock> {
        let row = sqlx::query(
            "SELECT status, updated_at, version, holder
             FROM division_locks
             WHERE tournament_id = $1 AND division_id = $2 AND family = $3
             FOR UPDATE",
        )
        .bind(&key.tournament_id)
        .bind(&key.division_id)
        .bind(family.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => Self::lock_from_row(&row),
            None => Err(StoreError::DivisionNotFound(key.clone())),
        }
    }

    async fn write_lock(
        tx: &mut Transaction<'_, Postgres>,
        key: &DivisionKey,
        family: LockFamily,
        lock: &GenerationLock,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE division_locks
             SET status = $4, updated_at = $5, version = $6, holder = $7
             WHERE tournament_id = $1 AND division_id = $2 AND family = $3",
        )
        .bind(&key.tournament_id)
        .bind(&key.division_id)
        .bind(family.as_str())
        .bind(lock.status.as_str())
        .bind(lock.updated_at)
        .bind(i64::try_from(lock.version).unwrap_or(i64::MAX))
        .bind(lock.holder)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Read the target match `FOR UPDATE`, patch it and write it back, so
    /// concurrent patches to different sides of one match both survive
    async fn apply_patch(
        tx: &mut Transaction<'_, Postgres>,
        key: &DivisionKey,
        patch: &MatchPatch,
    ) -> StoreResult<()> {
        let row = sqlx::query(
            "SELECT body FROM division_documents
             WHERE tournament_id = $1 AND division_id = $2 AND kind = $3 AND doc_id = $4
             FOR UPDATE",
        )
        .bind(&key.tournament_id)
        .bind(&key.division_id)
        .bind(KIND_MATCH)
        .bind(patch.match_id())
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::MissingMatch(patch.match_id().to_string()));
        };
        let mut target = row.try_get::<Json<Match>, _>("body")?.0;
        patch.apply(&mut target);
        Self::upsert_document(tx, key, KIND_MATCH, &target.id, &target).await
    }

    async fn upsert_document<T: serde::Serialize + Sync>(
        tx: &mut Transaction<'_, Postgres>,
        key: &DivisionKey,
        kind: &str,
        doc_id: &str,
        body: &T,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO division_documents (tournament_id, division_id, kind, doc_id, body, updated_at)
             VALUES ($1, $2, $3, $4, $5, NOW())
             ON CONFLICT (tournament_id, division_id, kind, doc_id)
             DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()",
        )
        .bind(&key.tournament_id)
        .bind(&key.division_id)
        .bind(kind)
        .bind(doc_id)
        .bind(Json(body))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn documents<T: serde::de::DeserializeOwned + Send + Unpin + 'static>(
        &self,
        key: &DivisionKey,
        kind: &str,
    ) -> StoreResult<Vec<T>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT body FROM division_documents
                 WHERE tournament_id = $1 AND division_id = $2 AND kind = $3",
            )
            .bind(&key.tournament_id)
            .bind(&key.division_id)
            .bind(kind)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|r| Ok(r.try_get::<Json<T>, _>("body")?.0))
            .collect()
    }

    async fn document<T: serde::de::DeserializeOwned + Send + Unpin + 'static>(
        &self,
        key: &DivisionKey,
        kind: &str,
        doc_id: &str,
    ) -> StoreResult<Option<T>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT body FROM division_documents
                 WHERE tournament_id = $1 AND division_id = $2 AND kind = $3 AND doc_id = $4",
            )
            .bind(&key.tournament_id)
            .bind(&key.division_id)
            .bind(kind)
            .bind(doc_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(|r| Ok(r.try_get::<Json<T>, _>("body")?.0))
            .transpose()
    }
}

#[async_trait]
impl DivisionStore for PgDivisionStore {
    async fn load_division(&self, key: &DivisionKey) -> StoreResult<Option<DivisionRecord>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT name, config FROM divisions WHERE tournament_id = $1 AND division_id = $2",
            )
            .bind(&key.tournament_id)
            .bind(&key.division_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = DivisionRecord::new(
            key.clone(),
            row.try_get::<String, _>("name")?,
            row.try_get::<Json<DivisionConfig>, _>("config")?.0,
        );

        let lock_rows = with_default_timeout(
            sqlx::query(
                "SELECT family, status, updated_at, version, holder
                 FROM division_locks WHERE tournament_id = $1 AND division_id = $2",
            )
            .bind(&key.tournament_id)
            .bind(&key.division_id)
            .fetch_all(&self.pool),
        )
        .await?;

        for row in &lock_rows {
            let family: String = row.try_get("family")?;
            let family: LockFamily = family
                .parse()
                .map_err(|e: String| StoreError::Corrupt("division_locks".to_string(), e))?;
            *record.lock_mut(family) = Self::lock_from_row(row)?;
        }

        Ok(Some(record))
    }

    async fn save_division(&self, record: &DivisionRecord) -> StoreResult<()> {
        let key = &record.key;
        with_timeout(DEFAULT_TRANSACTION_TIMEOUT, async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT INTO divisions (tournament_id, division_id, name, config)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (tournament_id, division_id)
                 DO UPDATE SET name = EXCLUDED.name, config = EXCLUDED.config, updated_at = NOW()",
            )
            .bind(&key.tournament_id)
            .bind(&key.division_id)
            .bind(&record.name)
            .bind(Json(&record.config))
            .execute(&mut *tx)
            .await?;

            for family in [LockFamily::PoolSchedule, LockFamily::Bracket] {
                sqlx::query(
                    "INSERT INTO division_locks (tournament_id, division_id, family, status, version)
                     VALUES ($1, $2, $3, $4, 0)
                     ON CONFLICT (tournament_id, division_id, family) DO NOTHING",
                )
                .bind(&key.tournament_id)
                .bind(&key.division_id)
                .bind(family.as_str())
                .bind(LockStatus::Idle.as_str())
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn load_pools(&self, key: &DivisionKey) -> StoreResult<Vec<Pool>> {
        let mut pools: Vec<Pool> = self.documents(key, KIND_POOL).await?;
        pools.sort_by(|a, b| compare_pool_labels(&a.key, &b.key));
        Ok(pools)
    }

    async fn save_pools(&self, key: &DivisionKey, pools: &[Pool]) -> StoreResult<()> {
        with_timeout(DEFAULT_TRANSACTION_TIMEOUT, async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "DELETE FROM division_documents
                 WHERE tournament_id = $1 AND division_id = $2 AND kind = $3",
            )
            .bind(&key.tournament_id)
            .bind(&key.division_id)
            .bind(KIND_POOL)
            .execute(&mut *tx)
            .await?;

            for pool in pools {
                Self::upsert_document(&mut tx, key, KIND_POOL, &pool.key, pool).await?;
            }

            tx.commit().await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn load_matches(
        &self,
        key: &DivisionKey,
        stage: Option<Stage>,
    ) -> StoreResult<Vec<Match>> {
        let mut matches: Vec<Match> = self.documents(key, KIND_MATCH).await?;
        if let Some(stage) = stage {
            matches.retain(|m| m.stage == stage);
        }
        matches.sort_by(schedule_order);
        Ok(matches)
    }

    async fn load_match(&self, key: &DivisionKey, match_id: &str) -> StoreResult<Option<Match>> {
        self.document(key, KIND_MATCH, match_id).await
    }

    async fn load_seed_document(
        &self,
        key: &DivisionKey,
        bracket_type: BracketType,
    ) -> StoreResult<Option<SeedDocument>> {
        let documents: Vec<SeedDocument> = self.documents(key, KIND_SEED).await?;
        Ok(documents
            .into_iter()
            .find(|d| d.bracket_type == bracket_type))
    }

    async fn load_standings(
        &self,
        key: &DivisionKey,
        pool_key: &str,
    ) -> StoreResult<Option<PoolStandings>> {
        self.document(key, KIND_STANDINGS, pool_key).await
    }

    async fn save_standings(
        &self,
        key: &DivisionKey,
        standings: &PoolStandings,
    ) -> StoreResult<()> {
        with_default_timeout(async {
            let mut tx = self.pool.begin().await?;
            Self::upsert_document(&mut tx, key, KIND_STANDINGS, &standings.pool_key, standings)
                .await?;
            tx.commit().await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn commit(&self, key: &DivisionKey, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        with_long_timeout(async {
            let mut tx = self.pool.begin().await?;

            for document in &batch.seed_documents {
                Self::upsert_document(&mut tx, key, KIND_SEED, &document.id, document).await?;
            }
            for m in &batch.matches {
                Self::upsert_document(&mut tx, key, KIND_MATCH, &m.id, m).await?;
            }
            if !batch.delete_matches.is_empty() {
                sqlx::query(
                    "DELETE FROM division_documents
                     WHERE tournament_id = $1 AND division_id = $2 AND kind = $3
                       AND doc_id = ANY($4)",
                )
                .bind(&key.tournament_id)
                .bind(&key.division_id)
                .bind(KIND_MATCH)
                .bind(&batch.delete_matches)
                .execute(&mut *tx)
                .await?;
            }
            for bracket_type in &batch.delete_seed_documents {
                sqlx::query(
                    "DELETE FROM division_documents
                     WHERE tournament_id = $1 AND division_id = $2 AND kind = $3
                       AND body->>'bracket_type' = $4",
                )
                .bind(&key.tournament_id)
                .bind(&key.division_id)
                .bind(KIND_SEED)
                .bind(bracket_type.as_str())
                .execute(&mut *tx)
                .await?;
            }
            for patch in &batch.patches {
                Self::apply_patch(&mut tx, key, patch).await?;
            }

            tx.commit().await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn try_acquire_lock(
        &self,
        key: &DivisionKey,
        family: LockFamily,
        holder: Uuid,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> StoreResult<LockAttempt> {
        with_timeout(DEFAULT_TRANSACTION_TIMEOUT, async {
            let mut tx = self.pool.begin().await?;
            let current = Self::locked_row(&mut tx, key, family).await?;

            let attempt = match current.try_acquire(holder, now, timeout) {
                Ok(next) => {
                    Self::write_lock(&mut tx, key, family, &next).await?;
                    LockAttempt::Acquired(next)
                }
                Err(conflict) => LockAttempt::Busy(conflict),
            };

            tx.commit().await?;
            Ok::<_, StoreError>(attempt)
        })
        .await
    }

    async fn release_lock(
        &self,
        key: &DivisionKey,
        family: LockFamily,
        holder: Uuid,
        now: DateTime<Utc>,
        success: bool,
    ) -> StoreResult<Option<GenerationLock>> {
        with_timeout(DEFAULT_TRANSACTION_TIMEOUT, async {
            let mut tx = self.pool.begin().await?;
            let current = Self::locked_row(&mut tx, key, family).await?;

            let released = current.release(holder, now, success);
            if let Some(next) = &released {
                Self::write_lock(&mut tx, key, family, next).await?;
            }

            tx.commit().await?;
            Ok::<_, StoreError>(released)
        })
        .await
    }
}
