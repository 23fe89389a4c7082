//! Qualifier selection from pool standings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::errors::{BracketError, BracketResult};
use crate::division::{
    Match, MatchId, ParticipantRef, PoolStandings, Stage, StandingRow, compare_pool_labels,
};

/// How many participants leave each pool for the main bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AdvancementRule {
    Top1,
    Top2,
    /// `n` per pool plus the best `wildcards` finishers at rank `n + 1`
    TopNPlusBest { n: u32, wildcards: u32 },
}

impl AdvancementRule {
    pub fn per_pool(&self) -> u32 {
        match self {
            AdvancementRule::Top1 => 1,
            AdvancementRule::Top2 => 2,
            AdvancementRule::TopNPlusBest { n, .. } => *n,
        }
    }

    pub fn wildcards(&self) -> u32 {
        match self {
            AdvancementRule::TopNPlusBest { wildcards, .. } => *wildcards,
            _ => 0,
        }
    }

    /// Highest pool rank that can end up seeded (K).
    ///
    /// # Errors
    ///
    /// * `BracketError::UnsupportedAdvancement` - K outside {1, 2}
    pub fn max_seed_rank(&self) -> BracketResult<u32> {
        let per_pool = self.per_pool();
        if per_pool == 0 {
            return Err(BracketError::UnsupportedAdvancement {
                rule: self.to_string(),
                reason: "at least one participant per pool must advance".to_string(),
            });
        }

        let k = per_pool + u32::from(self.wildcards() > 0);
        if k > 2 {
            return Err(BracketError::UnsupportedAdvancement {
                rule: self.to_string(),
                reason: format!("seeding supports pool ranks 1 and 2 only, rule needs rank {k}"),
            });
        }
        Ok(k)
    }
}

impl fmt::Display for AdvancementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvancementRule::Top1 => write!(f, "top_1"),
            AdvancementRule::Top2 => write!(f, "top_2"),
            AdvancementRule::TopNPlusBest { n, wildcards } => {
                write!(f, "top_{n}_plus_{wildcards}_best")
            }
        }
    }
}

/// Participant advancing to the main bracket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualifier {
    pub participant: ParticipantRef,
    pub pool_key: String,
    pub pool_rank: u32,
    pub wildcard: bool,
}

/// Participant not advancing to the main bracket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remainder {
    pub participant: ParticipantRef,
    pub pool_key: String,
    pub pool_rank: u32,
    /// Goes to the plate bracket rather than being eliminated
    pub plate_eligible: bool,
}

/// Split of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolQualification {
    pub pool_key: String,
    pub qualifiers: Vec<Qualifier>,
    pub remainder: Vec<Remainder>,
}

/// Split of every pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationOutcome {
    pub max_seed_rank: u32,
    pub pools: Vec<PoolQualification>,
}

impl QualificationOutcome {
    pub fn qualifiers(&self) -> impl Iterator<Item = &Qualifier> {
        self.pools.iter().flat_map(|p| p.qualifiers.iter())
    }

    pub fn plate_eligible(&self) -> impl Iterator<Item = &Remainder> {
        self.pools
            .iter()
            .flat_map(|p| p.remainder.iter())
            .filter(|r| r.plate_eligible)
    }
}

/// Fail closed unless every expected pairing is stored with a finalized result.
///
/// `expected` holds the canonical ids the current pool assignment produces;
/// stored matches outside it are ignored.
///
/// # Errors
///
/// * `BracketError::PoolStageIncomplete` - Unfinished and unscheduled pairings
pub fn ensure_pool_stage_complete(expected: &[MatchId], stored: &[Match]) -> BracketResult<()> {
    let by_id: HashMap<&str, &Match> = stored
        .iter()
        .filter(|m| m.stage == Stage::Pool)
        .map(|m| (m.id.as_str(), m))
        .collect();

    let mut blocking = Vec::new();
    let mut unscheduled = Vec::new();
    for id in expected {
        match by_id.get(id.as_str()) {
            Some(m) if m.has_finalized_result() => {}
            Some(_) => blocking.push(id.clone()),
            None => unscheduled.push(id.clone()),
        }
    }

    if blocking.is_empty() && unscheduled.is_empty() {
        return Ok(());
    }

    blocking.sort();
    unscheduled.sort();
    Err(BracketError::PoolStageIncomplete {
        count: blocking.len() + unscheduled.len(),
        blocking,
        unscheduled,
    })
}

/// Partitions pool finishers into qualifiers, plate-eligible and eliminated
#[derive(Debug, Clone)]
pub struct QualifierSelector {
    rule: AdvancementRule,
    plate_enabled: bool,
}

impl QualifierSelector {
    pub fn new(rule: AdvancementRule, plate_enabled: bool) -> Self {
        Self {
            rule,
            plate_enabled,
        }
    }

    /// Select qualifiers.
    ///
    /// `pool_matches` must be the pool matches of the current assignment;
    /// selection refuses to run while any of them is unfinished. Coverage of
    /// the assignment is checked by the caller.
    pub fn select(
        &self,
        pool_matches: &[Match],
        standings: &[PoolStandings],
    ) -> BracketResult<QualificationOutcome> {
        let max_seed_rank = self.rule.max_seed_rank()?;
        let ids: Vec<MatchId> = pool_matches.iter().map(|m| m.id.clone()).collect();
        ensure_pool_stage_complete(&ids, pool_matches)?;

        let per_pool = self.rule.per_pool();

        let mut ordered: Vec<&PoolStandings> = standings.iter().collect();
        ordered.sort_by(|a, b| compare_pool_labels(&a.pool_key, &b.pool_key));

        let wildcard_ids = self.pick_wildcards(&ordered, per_pool);

        let pools = ordered
            .into_iter()
            .map(|pool| {
                let mut qualifiers = Vec::new();
                let mut remainder = Vec::new();

                for row in &pool.rows {
                    let participant = ParticipantRef {
                        id: row.participant_id.clone(),
                        name: row.name.clone(),
                    };
                    let wildcard = wildcard_ids.contains(&row.participant_id);

                    if row.rank <= per_pool || wildcard {
                        qualifiers.push(Qualifier {
                            participant,
                            pool_key: pool.pool_key.clone(),
                            pool_rank: row.rank,
                            wildcard,
                        });
                    } else {
                        remainder.push(Remainder {
                            participant,
                            pool_key: pool.pool_key.clone(),
                            pool_rank: row.rank,
                            plate_eligible: self.plate_enabled,
                        });
                    }
                }

                PoolQualification {
                    pool_key: pool.pool_key.clone(),
                    qualifiers,
                    remainder,
                }
            })
            .collect();

        Ok(QualificationOutcome {
            max_seed_rank,
            pools,
        })
    }

    /// Best finishers at rank `per_pool + 1` across pools
    fn pick_wildcards(&self, pools: &[&PoolStandings], per_pool: u32) -> Vec<String> {
        let wildcards = self.rule.wildcards() as usize;
        if wildcards == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<(&str, &StandingRow)> = pools
            .iter()
            .filter_map(|p| p.row_at_rank(per_pool + 1).map(|r| (p.pool_key.as_str(), r)))
            .collect();

        candidates.sort_by(|(pool_a, a), (pool_b, b)| {
            b.wins
                .cmp(&a.wins)
                .then_with(|| b.differential.cmp(&a.differential))
                .then_with(|| b.points_for.cmp(&a.points_for))
                .then_with(|| compare_pool_labels(pool_a, pool_b))
        });

        candidates
            .into_iter()
            .take(wildcards)
            .map(|(_, r)| r.participant_id.clone())
            .collect()
    }
}
