//! Pool standings with a configurable tiebreaker chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::division::{Match, Pool, PoolStandings, Slot, Stage, StandingRow};

/// Criteria applied, in order, to participants level on wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tiebreaker {
    /// Wins in the mini round-robin among the tied participants only
    HeadToHead,
    PointDifferential,
    PointsFor,
    /// Fewer points conceded ranks higher
    PointsAgainst,
}

impl Tiebreaker {
    pub fn default_chain() -> Vec<Tiebreaker> {
        vec![
            Tiebreaker::HeadToHead,
            Tiebreaker::PointDifferential,
            Tiebreaker::PointsFor,
        ]
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    played: u32,
    wins: u32,
    losses: u32,
    points_for: u32,
    points_against: u32,
}

impl Tally {
    fn differential(&self) -> i64 {
        self.points_for as i64 - self.points_against as i64
    }
}

/// A counted result between two pool members (indices into the pool)
#[derive(Debug, Clone, Copy)]
struct Counted {
    winner: usize,
    loser: usize,
}

/// Ranks a pool from its finalized match results
#[derive(Debug, Clone)]
pub struct StandingsCalculator {
    tiebreakers: Vec<Tiebreaker>,
}

impl Default for StandingsCalculator {
    fn default() -> Self {
        Self::new(Tiebreaker::default_chain())
    }
}

impl StandingsCalculator {
    pub fn new(tiebreakers: Vec<Tiebreaker>) -> Self {
        Self { tiebreakers }
    }

    /// Compute ranked standings.
    ///
    /// `matches` may contain anything tagged to the pool in any state; only
    /// officially finalized results between pool members count. Never fails:
    /// incomplete pools are ranked on whatever exists.
    pub fn compute(&self, pool: &Pool, matches: &[Match]) -> PoolStandings {
        let index: HashMap<&str, usize> = pool
            .participants
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), i))
            .collect();

        let mut tallies = vec![Tally::default(); pool.size()];
        let mut counted = Vec::new();
        let mut watermark: Option<DateTime<Utc>> = None;

        for m in counted_matches(pool, matches) {
            let Some(result) = m.result.as_ref() else {
                continue;
            };
            let (Some(a), Some(b)) = (m.side_a.participant(), m.side_b.participant()) else {
                continue;
            };
            let (Some(&ia), Some(&ib)) = (index.get(a.id.as_str()), index.get(b.id.as_str()))
            else {
                continue;
            };

            let (winner, loser) = match result.winner {
                Slot::A => (ia, ib),
                Slot::B => (ib, ia),
            };

            let points_a = result.points(Slot::A);
            let points_b = result.points(Slot::B);

            tallies[ia].played += 1;
            tallies[ia].points_for += points_a;
            tallies[ia].points_against += points_b;
            tallies[ib].played += 1;
            tallies[ib].points_for += points_b;
            tallies[ib].points_against += points_a;
            tallies[winner].wins += 1;
            tallies[loser].losses += 1;

            counted.push(Counted { winner, loser });

            if let Some(at) = result.recorded_at {
                watermark = Some(watermark.map_or(at, |w| w.max(at)));
            }
        }

        // Stable sort keeps registration order inside a wins group.
        let mut order: Vec<usize> = (0..pool.size()).collect();
        order.sort_by(|&x, &y| tallies[y].wins.cmp(&tallies[x].wins));

        let mut ranked = Vec::with_capacity(order.len());
        let mut start = 0;
        while start < order.len() {
            let wins = tallies[order[start]].wins;
            let end = order[start..]
                .iter()
                .position(|&i| tallies[i].wins != wins)
                .map_or(order.len(), |offset| start + offset);

            ranked.extend(self.resolve(order[start..end].to_vec(), &tallies, &counted));
            start = end;
        }

        let rows = ranked
            .into_iter()
            .enumerate()
            .map(|(rank, i)| {
                let tally = tallies[i];
                let participant = &pool.participants[i];
                StandingRow {
                    participant_id: participant.id.clone(),
                    name: participant.name.clone(),
                    rank: rank as u32 + 1,
                    played: tally.played,
                    wins: tally.wins,
                    losses: tally.losses,
                    points_for: tally.points_for,
                    points_against: tally.points_against,
                    differential: tally.differential(),
                }
            })
            .collect();

        PoolStandings {
            pool_key: pool.key.clone(),
            rows,
            watermark,
            fingerprint: results_fingerprint(pool, matches),
        }
    }

    /// Order a group level on wins.
    ///
    /// The first criterion that separates the group splits it into buckets;
    /// each smaller bucket restarts the chain, so head-to-head is always
    /// recomputed against the participants still tied.
    fn resolve(&self, group: Vec<usize>, tallies: &[Tally], counted: &[Counted]) -> Vec<usize> {
        if group.len() <= 1 {
            return group;
        }

        for tiebreaker in &self.tiebreakers {
            let metrics: Vec<i64> = group
                .iter()
                .map(|&i| metric(*tiebreaker, i, &group, tallies, counted))
                .collect();

            if metrics.iter().all(|&m| m == metrics[0]) {
                continue;
            }

            let mut scored: Vec<(usize, i64)> = group.iter().copied().zip(metrics).collect();
            scored.sort_by(|x, y| y.1.cmp(&x.1));

            let mut ordered = Vec::with_capacity(group.len());
            let mut start = 0;
            while start < scored.len() {
                let value = scored[start].1;
                let end = scored[start..]
                    .iter()
                    .position(|&(_, m)| m != value)
                    .map_or(scored.len(), |offset| start + offset);
                let bucket: Vec<usize> = scored[start..end].iter().map(|&(i, _)| i).collect();
                ordered.extend(self.resolve(bucket, tallies, counted));
                start = end;
            }
            return ordered;
        }

        // Exhausted the chain: fall back to registration order.
        let mut group = group;
        group.sort_unstable();
        group
    }
}

fn metric(
    tiebreaker: Tiebreaker,
    participant: usize,
    group: &[usize],
    tallies: &[Tally],
    counted: &[Counted],
) -> i64 {
    match tiebreaker {
        Tiebreaker::HeadToHead => counted
            .iter()
            .filter(|c| c.winner == participant && group.contains(&c.loser))
            .count() as i64,
        Tiebreaker::PointDifferential => tallies[participant].differential(),
        Tiebreaker::PointsFor => tallies[participant].points_for as i64,
        Tiebreaker::PointsAgainst => -(tallies[participant].points_against as i64),
    }
}

/// Pool matches whose official result counts toward standings
fn counted_matches<'m>(pool: &'m Pool, matches: &'m [Match]) -> impl Iterator<Item = &'m Match> {
    matches.iter().filter(move |m| {
        m.stage == Stage::Pool
            && m.pool_key.as_deref() == Some(pool.key.as_str())
            && m.has_finalized_result()
    })
}

/// Latest contributing result timestamp for a pool
pub fn latest_watermark(pool: &Pool, matches: &[Match]) -> Option<DateTime<Utc>> {
    counted_matches(pool, matches)
        .filter_map(|m| m.result.as_ref().and_then(|r| r.recorded_at))
        .max()
}

/// Canonical text of every counted result in a pool, sorted by match id.
///
/// Two match sets produce the same fingerprint exactly when they would feed
/// the calculator the same results, so a retracted or rescored result
/// changes it even when no newer timestamp appears.
pub fn results_fingerprint(pool: &Pool, matches: &[Match]) -> String {
    let mut entries: Vec<String> = counted_matches(pool, matches)
        .filter_map(|m| {
            let result = m.result.as_ref()?;
            let games: Vec<String> = result
                .games
                .iter()
                .map(|g| format!("{}-{}", g.a, g.b))
                .collect();
            Some(format!(
                "{}={:?}/{:?}/{}",
                m.id,
                result.winner,
                result.kind,
                games.join(",")
            ))
        })
        .collect();
    entries.sort_unstable();
    entries.join(";")
}

/// Whether stored standings differ from what the current results produce
pub fn needs_recompute(
    stored: Option<&PoolStandings>,
    latest: Option<DateTime<Utc>>,
    fingerprint: &str,
) -> bool {
    let Some(standings) = stored else {
        return true;
    };
    if standings.fingerprint != fingerprint {
        return true;
    }
    match latest {
        None => false,
        Some(latest) => standings.watermark.is_none_or(|w| w < latest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::division::{
        DivisionKey, GameScore, MatchResult, MatchSide, MatchStatus, Participant, ResultKind,
        ScoringConfig,
    };
    use chrono::TimeZone;

    fn pool(ids: &[&str]) -> Pool {
        Pool::new(
            "A",
            ids.iter().map(|id| Participant::new(*id, id.to_uppercase())).collect(),
        )
    }

    fn result(winner: &str, loser: &str, w_pts: u32, l_pts: u32, minute: u32) -> Match {
        Match {
            id: format!("{winner}-{loser}"),
            division: DivisionKey::new("t", "d"),
            stage: Stage::Pool,
            bracket_type: None,
            pool_key: Some("A".to_string()),
            round: 1,
            position: 1,
            side_a: MatchSide::Participant(Participant::new(winner, winner).to_ref()),
            side_b: MatchSide::Participant(Participant::new(loser, loser).to_ref()),
            next_match_id: None,
            next_match_slot: None,
            loser_next_match_id: None,
            loser_next_match_slot: None,
            is_bronze: false,
            status: MatchStatus::Completed,
            result: Some(MatchResult {
                winner: Slot::A,
                kind: ResultKind::Played,
                games: vec![GameScore::new(w_pts, l_pts)],
                finalized: true,
                recorded_at: Some(Utc.with_ymd_and_hms(2026, 5, 1, 10, minute, 0).unwrap()),
            }),
            scoring: ScoringConfig::default(),
        }
    }

    fn ranking(standings: &PoolStandings) -> Vec<&str> {
        standings.rows.iter().map(|r| r.participant_id.as_str()).collect()
    }

    #[test]
    fn test_clear_ranking_without_tiebreakers() {
        let pool = pool(&["d", "c", "b", "a"]);
        let matches = vec![
            result("a", "b", 21, 10, 1),
            result("a", "c", 21, 10, 2),
            result("a", "d", 21, 10, 3),
            result("b", "c", 21, 10, 4),
            result("b", "d", 21, 10, 5),
            result("c", "d", 21, 10, 6),
        ];

        let standings = StandingsCalculator::new(vec![]).compute(&pool, &matches);
        assert_eq!(ranking(&standings), vec!["a", "b", "c", "d"]);
        assert_eq!(standings.rows[0].wins, 3);
        assert_eq!(standings.rows[3].losses, 3);
        assert_eq!(standings.rows[1].differential, 11);
        assert_eq!(
            standings.watermark,
            Some(Utc.with_ymd_and_hms(2026, 5, 1, 10, 6, 0).unwrap())
        );
    }

    #[test]
    fn test_three_way_cycle_falls_through_to_differential() {
        let pool = pool(&["a", "b", "c"]);
        let matches = vec![
            result("c", "b", 21, 19, 1),
            result("b", "a", 21, 5, 2),
            result("a", "c", 21, 5, 3),
        ];
        // All 1-1 with one head-to-head win each; differentials b +14, a 0, c -14
        let standings = StandingsCalculator::default().compute(&pool, &matches);
        assert_eq!(ranking(&standings), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_head_to_head_beats_differential() {
        let pool = pool(&["a", "b", "c", "d"]);
        let matches = vec![
            result("b", "a", 21, 10, 1),
            result("c", "b", 21, 19, 2),
            result("b", "d", 21, 0, 3),
            result("c", "d", 21, 19, 4),
            result("a", "c", 21, 10, 5),
            result("d", "a", 21, 15, 6),
        ];
        // b and c are 2-1 (b +30, c -7) but c won their meeting;
        // a and d are 1-2 and d won their meeting
        let standings = StandingsCalculator::default().compute(&pool, &matches);
        assert_eq!(ranking(&standings), vec!["c", "b", "d", "a"]);
        assert_eq!(standings.rows[1].differential, 30);
    }

    #[test]
    fn test_head_to_head_restricted_to_tied_subset() {
        // a, b, c all 2-1 (each lost once); d 0-3.
        // Among {a, b, c}: a beat b, b beat c, c beat a → cycle, so differential decides,
        // then the remaining pair restarts the chain on head-to-head.
        let pool = pool(&["a", "b", "c", "d"]);
        let matches = vec![
            result("a", "b", 21, 19, 1),
            result("b", "c", 21, 19, 2),
            result("c", "a", 21, 19, 3),
            result("a", "d", 21, 0, 4),
            result("b", "d", 21, 10, 5),
            result("c", "d", 21, 10, 6),
        ];
        let standings = StandingsCalculator::default().compute(&pool, &matches);
        // differentials: a = 2 - 2 + 21 = 21, b = -2 + 2 + 11 = 11, c = -2 + 2 + 11 = 11
        // b vs c restart: b beat c head-to-head
        assert_eq!(ranking(&standings), vec!["a", "b", "c", "d"]);
        assert_eq!(standings.rows[0].differential, 21);
    }

    #[test]
    fn test_unfinalized_results_ignored() {
        let pool = pool(&["a", "b"]);
        let mut proposed = result("b", "a", 21, 3, 1);
        proposed.result.as_mut().unwrap().finalized = false;

        let standings = StandingsCalculator::default().compute(&pool, &[proposed]);
        assert_eq!(ranking(&standings), vec!["a", "b"]);
        assert!(standings.rows.iter().all(|r| r.played == 0));
        assert_eq!(standings.watermark, None);
    }

    #[test]
    fn test_other_pool_matches_ignored() {
        let pool = pool(&["a", "b"]);
        let mut elsewhere = result("b", "a", 21, 3, 1);
        elsewhere.pool_key = Some("B".to_string());

        let standings = StandingsCalculator::default().compute(&pool, &[elsewhere]);
        assert!(standings.rows.iter().all(|r| r.wins == 0));
    }

    #[test]
    fn test_points_against_tiebreaker() {
        let pool = pool(&["a", "b", "c", "d"]);
        let matches = vec![result("a", "c", 21, 15, 1), result("b", "d", 21, 10, 2)];
        let standings =
            StandingsCalculator::new(vec![Tiebreaker::PointsAgainst]).compute(&pool, &matches);
        assert_eq!(ranking(&standings), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_needs_recompute() {
        let t1 = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 5, 1, 11, 0, 0).unwrap();
        let stored = PoolStandings {
            pool_key: "A".to_string(),
            rows: vec![],
            watermark: Some(t1),
            fingerprint: "a-b=A/Played/21-10".to_string(),
        };

        assert!(needs_recompute(None, None, ""));
        assert!(needs_recompute(Some(&stored), Some(t2), &stored.fingerprint));
        assert!(!needs_recompute(Some(&stored), Some(t1), &stored.fingerprint));
        assert!(needs_recompute(Some(&stored), Some(t1), "a-b=A/Played/21-12"));
        assert!(needs_recompute(Some(&stored), None, ""));
    }

    #[test]
    fn test_fingerprint_tracks_retracted_results() {
        let pool = pool(&["a", "b", "c"]);
        let early = result("a", "b", 21, 10, 1);
        let late = result("c", "a", 21, 10, 2);
        let both = StandingsCalculator::default().compute(&pool, &[early.clone(), late.clone()]);

        let mut retracted = early.clone();
        retracted.result.as_mut().unwrap().finalized = false;
        let matches = vec![retracted, late];

        // The newest counted result is unchanged, so the watermark alone would not notice
        assert_eq!(latest_watermark(&pool, &matches), both.watermark);
        let fingerprint = results_fingerprint(&pool, &matches);
        assert_ne!(fingerprint, both.fingerprint);
        assert!(needs_recompute(Some(&both), latest_watermark(&pool, &matches), &fingerprint));
    }

    #[test]
    fn test_fingerprint_ignores_match_order() {
        let pool = pool(&["a", "b", "c"]);
        let first = result("a", "b", 21, 10, 1);
        let second = result("c", "a", 21, 10, 2);
        assert_eq!(
            results_fingerprint(&pool, &[first.clone(), second.clone()]),
            results_fingerprint(&pool, &[second, first])
        );
    }
}
