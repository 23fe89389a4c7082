//! Round-robin pool schedule generation (circle method).

use std::collections::{HashMap, HashSet};

use crate::bracket::errors::{BracketError, BracketResult};
use crate::division::{
    Coordinate, DivisionKey, IdScope, IdStrategy, Match, MatchSide, MatchStatus, Participant,
    Pool, ScoringConfig, Stage,
};

/// Builds every pool's round-robin matches from a participant-to-pool assignment
pub struct PoolScheduleBuilder<'a> {
    ids: &'a dyn IdStrategy,
    scoring: ScoringConfig,
}

impl<'a> PoolScheduleBuilder<'a> {
    pub fn new(ids: &'a dyn IdStrategy, scoring: ScoringConfig) -> Self {
        Self { ids, scoring }
    }

    /// Generate matches for all pools.
    ///
    /// # Errors
    ///
    /// * `BracketError::EmptyPoolAssignment` - No pools
    /// * `BracketError::PoolTooSmall` - A pool with fewer than 2 participants
    /// * `BracketError::EmptyPoolKey` / `DuplicatePoolKey` / `DuplicateParticipant` - Ambiguous assignment
    /// * `BracketError::DuplicateMatchId` - The id strategy mapped two pairings to one id
    pub fn build(&self, division: &DivisionKey, pools: &[Pool]) -> BracketResult<Vec<Match>> {
        validate_assignment(pools)?;

        let mut matches = Vec::new();
        for pool in pools {
            matches.extend(self.build_pool(division, pool));
        }

        let mut seen = HashSet::with_capacity(matches.len());
        if let Some(dup) = matches.iter().find(|m| !seen.insert(m.id.as_str())) {
            return Err(BracketError::DuplicateMatchId(dup.id.clone()));
        }
        Ok(matches)
    }

    fn build_pool(&self, division: &DivisionKey, pool: &Pool) -> Vec<Match> {
        let scope = IdScope::Pool {
            pool_key: pool.key.clone(),
        };

        // Odd pools get a phantom entry; whoever faces it rests that round.
        let mut ring: Vec<Option<&Participant>> = pool.participants.iter().map(Some).collect();
        if ring.len() % 2 == 1 {
            ring.push(None);
        }

        let size = ring.len();
        let mut matches = Vec::with_capacity(pool.size() * (pool.size() - 1) / 2);

        for round in 1..size as u32 {
            let mut position = 0;
            for i in 0..size / 2 {
                let (Some(a), Some(b)) = (ring[i], ring[size - 1 - i]) else {
                    continue;
                };
                position += 1;

                matches.push(Match {
                    id: self
                        .ids
                        .canonical_id(division, &scope, &Coordinate::pairing(&a.id, &b.id)),
                    division: division.clone(),
                    stage: Stage::Pool,
                    bracket_type: None,
                    pool_key: Some(pool.key.clone()),
                    round,
                    position,
                    side_a: MatchSide::Participant(a.to_ref()),
                    side_b: MatchSide::Participant(b.to_ref()),
                    next_match_id: None,
                    next_match_slot: None,
                    loser_next_match_id: None,
                    loser_next_match_slot: None,
                    is_bronze: false,
                    status: MatchStatus::Scheduled,
                    result: None,
                    scoring: self.scoring,
                });
            }

            // Fix the first entry, rotate the rest one step clockwise.
            ring[1..].rotate_right(1);
        }

        matches
    }
}

/// Check a pool assignment is usable before anything is written
pub fn validate_assignment(pools: &[Pool]) -> BracketResult<()> {
    if pools.is_empty() {
        return Err(BracketError::EmptyPoolAssignment);
    }

    let mut seen_keys: HashSet<&str> = HashSet::new();
    let mut seen_participants: HashMap<&str, &str> = HashMap::new();

    for pool in pools {
        if pool.key.is_empty() {
            return Err(BracketError::EmptyPoolKey(pool.name.clone()));
        }

        if pool.size() < 2 {
            return Err(BracketError::PoolTooSmall {
                pool_key: pool.key.clone(),
                size: pool.size(),
            });
        }

        if !seen_keys.insert(pool.key.as_str()) {
            return Err(BracketError::DuplicatePoolKey(pool.key.clone()));
        }

        for participant in &pool.participants {
            if let Some(first_pool) =
                seen_participants.insert(participant.id.as_str(), pool.key.as_str())
            {
                return Err(BracketError::DuplicateParticipant {
                    participant_id: participant.id.clone(),
                    first_pool: first_pool.to_string(),
                    second_pool: pool.key.clone(),
                });
            }
        }
    }

    Ok(())
}
