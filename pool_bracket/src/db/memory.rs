//! In-memory [`DivisionStore`] for tests and embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::repository::{DivisionStore, LockAttempt, WriteBatch, schedule_order};
use crate::division::{
    BracketType, DivisionKey, DivisionRecord, Match, MatchId, Pool, PoolStandings, SeedDocument,
    Stage, compare_pool_labels,
};
use crate::generation::lock::{GenerationLock, LockFamily};

#[derive(Debug, Default)]
struct DivisionState {
    record: Option<DivisionRecord>,
    pools: Vec<Pool>,
    matches: BTreeMap<MatchId, Match>,
    seeds: BTreeMap<BracketType, SeedDocument>,
    standings: BTreeMap<String, PoolStandings>,
}

/// Every operation takes one mutex, so each call is atomic.
#[derive(Debug, Default)]
pub struct MemoryDivisionStore {
    divisions: Mutex<HashMap<DivisionKey, DivisionState>>,
    failing_standings_writes: AtomicU32,
    fail_commits: AtomicBool,
    commit_count: AtomicU32,
}

impl MemoryDivisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` standings writes fail
    pub fn fail_standings_writes(&self, count: u32) {
        self.failing_standings_writes.store(count, Ordering::SeqCst);
    }

    /// Make every batch commit fail until reset
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful batch commits
    pub fn commit_count(&self) -> u32 {
        self.commit_count.load(Ordering::SeqCst)
    }

    /// Overwrite a lock directly, bypassing acquire/release
    pub async fn force_lock(&self, key: &DivisionKey, family: LockFamily, lock: GenerationLock) {
        let mut divisions = self.divisions.lock().await;
        if let Some(record) = divisions.get_mut(key).and_then(|s| s.record.as_mut()) {
            *record.lock_mut(family) = lock;
        }
    }
}

fn record_mut<'a>(
    divisions: &'a mut HashMap<DivisionKey, DivisionState>,
    key: &DivisionKey,
) -> StoreResult<&'a mut DivisionRecord> {
    divisions
        .get_mut(key)
        .and_then(|s| s.record.as_mut())
        .ok_or_else(|| StoreError::DivisionNotFound(key.clone()))
}

#[async_trait]
impl DivisionStore for MemoryDivisionStore {
    async fn load_division(&self, key: &DivisionKey) -> StoreResult<Option<DivisionRecord>> {
        let divisions = self.divisions.lock().await;
        Ok(divisions.get(key).and_then(|s| s.record.clone()))
    }

    async fn save_division(&self, record: &DivisionRecord) -> StoreResult<()> {
        let mut divisions = self.divisions.lock().await;
        let state = divisions.entry(record.key.clone()).or_default();
        match state.record.as_mut() {
            Some(existing) => {
                existing.name = record.name.clone();
                existing.config = record.config.clone();
            }
            None => state.record = Some(record.clone()),
        }
        Ok(())
    }

    async fn load_pools(&self, key: &DivisionKey) -> StoreResult<Vec<Pool>> {
        let divisions = self.divisions.lock().await;
        let mut pools = divisions
            .get(key)
            .map(|s| s.pools.clone())
            .unwrap_or_default();
        pools.sort_by(|a, b| compare_pool_labels(&a.key, &b.key));
        Ok(pools)
    }

    async fn save_pools(&self, key: &DivisionKey, pools: &[Pool]) -> StoreResult<()> {
        let mut divisions = self.divisions.lock().await;
        divisions.entry(key.clone()).or_default().pools = pools.to_vec();
        Ok(())
    }

    async fn load_matches(
        &self,
        key: &DivisionKey,
        stage: Option<Stage>,
    ) -> StoreResult<Vec<Match>> {
        let divisions = self.divisions.lock().await;
        let mut matches: Vec<Match> = divisions
            .get(key)
            .map(|s| {
                s.matches
                    .values()
                    .filter(|m| stage.is_none_or(|stage| m.stage == stage))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matches.sort_by(schedule_order);
        Ok(matches)
    }

    async fn load_match(&self, key: &DivisionKey, match_id: &str) -> StoreResult<Option<Match>> {
        let divisions = self.divisions.lock().await;
        Ok(divisions
            .get(key)
            .and_then(|s| s.matches.get(match_id).cloned()))
    }

    async fn load_seed_document(
        &self,
        key: &DivisionKey,
        bracket_type: BracketType,
    ) -> StoreResult<Option<SeedDocument>> {
        let divisions = self.divisions.lock().await;
        Ok(divisions
            .get(key)
            .and_then(|s| s.seeds.get(&bracket_type).cloned()))
    }

    async fn load_standings(
        &self,
        key: &DivisionKey,
        pool_key: &str,
    ) -> StoreResult<Option<PoolStandings>> {
        let divisions = self.divisions.lock().await;
        Ok(divisions
            .get(key)
            .and_then(|s| s.standings.get(pool_key).cloned()))
    }

    async fn save_standings(
        &self,
        key: &DivisionKey,
        standings: &PoolStandings,
    ) -> StoreResult<()> {
        let failing = self
            .failing_standings_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Unavailable(
                "standings write rejected".to_string(),
            ));
        }

        let mut divisions = self.divisions.lock().await;
        divisions
            .entry(key.clone())
            .or_default()
            .standings
            .insert(standings.pool_key.clone(), standings.clone());
        Ok(())
    }

    async fn commit(&self, key: &DivisionKey, batch: WriteBatch) -> StoreResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("batch commit rejected".to_string()));
        }

        let mut divisions = self.divisions.lock().await;
        let state = divisions.entry(key.clone()).or_default();

        // Reject before mutating so a failed commit writes nothing
        for patch in &batch.patches {
            let id = patch.match_id();
            let written = batch.matches.iter().any(|m| m.id == id);
            let deleted = batch.delete_matches.iter().any(|d| d == id);
            if deleted || !(written || state.matches.contains_key(id)) {
                return Err(StoreError::MissingMatch(id.to_string()));
            }
        }

        for document in batch.seed_documents {
            state.seeds.insert(document.bracket_type, document);
        }
        for m in batch.matches {
            state.matches.insert(m.id.clone(), m);
        }
        for id in &batch.delete_matches {
            state.matches.remove(id);
        }
        for bracket_type in &batch.delete_seed_documents {
            state.seeds.remove(bracket_type);
        }
        for patch in &batch.patches {
            if let Some(target) = state.matches.get_mut(patch.match_id()) {
                patch.apply(target);
            }
        }

        self.commit_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn try_acquire_lock(
        &self,
        key: &DivisionKey,
        family: LockFamily,
        holder: Uuid,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> StoreResult<LockAttempt> {
        let mut divisions = self.divisions.lock().await;
        let lock = record_mut(&mut divisions, key)?.lock_mut(family);

        Ok(match lock.try_acquire(holder, now, timeout) {
            Ok(next) => {
                *lock = next.clone();
                LockAttempt::Acquired(next)
            }
            Err(conflict) => LockAttempt::Busy(conflict),
        })
    }

    async fn release_lock(
        &self,
        key: &DivisionKey,
        family: LockFamily,
        holder: Uuid,
        now: DateTime<Utc>,
        success: bool,
    ) -> StoreResult<Option<GenerationLock>> {
        let mut divisions = self.divisions.lock().await;
        let lock = record_mut(&mut divisions, key)?.lock_mut(family);

        let released = lock.release(holder, now, success);
        if let Some(next) = &released {
            *lock = next.clone();
        }
        Ok(released)
    }
}
