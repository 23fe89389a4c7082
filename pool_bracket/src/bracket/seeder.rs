//! Seed document construction: BYE assignment and round-1 pairing.

use std::collections::{BTreeMap, HashSet};

use super::errors::{BracketError, BracketResult};
use super::qualifier::QualificationOutcome;
use crate::division::{
    BracketType, Coordinate, DivisionKey, IdScope, IdStrategy, SeedDocument, SeedPair, SeedSlot,
    compare_pool_labels,
};

/// Pairing applied to the seeds left after BYEs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairingPolicy {
    /// Main bracket, pool winners only
    Winners,
    /// Main bracket, pool winners and runners-up
    WinnersAndRunnersUp,
    /// Plate bracket: fold the combined list
    Fold,
}

/// Converts qualifiers (or plate-eligible finishers) into a [`SeedDocument`]
pub struct BracketSeeder<'a> {
    ids: &'a dyn IdStrategy,
    division: &'a DivisionKey,
}

impl<'a> BracketSeeder<'a> {
    pub fn new(ids: &'a dyn IdStrategy, division: &'a DivisionKey) -> Self {
        Self { ids, division }
    }

    fn document_id(&self, bracket_type: BracketType) -> String {
        self.ids.canonical_id(
            self.division,
            &IdScope::Seed(bracket_type),
            &Coordinate::Document,
        )
    }

    /// Seed the main bracket from pool qualifiers.
    ///
    /// # Errors
    ///
    /// * `BracketError::TooFewQualifiers` - Fewer than 2 qualifiers
    /// * `BracketError::UnsupportedAdvancement` - A qualifier ranked below 2nd
    /// * Consistency errors if an internal invariant breaks
    pub fn seed_main(&self, outcome: &QualificationOutcome) -> BracketResult<SeedDocument> {
        let slots: Vec<SeedSlot> = outcome
            .qualifiers()
            .map(|q| SeedSlot {
                key: SeedSlot::slot_key(&q.pool_key, q.pool_rank),
                participant: q.participant.clone(),
                pool_key: q.pool_key.clone(),
                pool_rank: q.pool_rank,
            })
            .collect();

        if slots.len() < 2 {
            return Err(BracketError::TooFewQualifiers(slots.len()));
        }

        let policy = match slots.iter().map(|s| s.pool_rank).max().unwrap_or(1) {
            1 => PairingPolicy::Winners,
            2 => PairingPolicy::WinnersAndRunnersUp,
            rank => {
                return Err(BracketError::UnsupportedAdvancement {
                    rule: format!("rank {rank} qualifiers"),
                    reason: "main bracket seeding supports pool ranks 1 and 2 only".to_string(),
                });
            }
        };

        self.build(BracketType::Main, slots, policy)
    }

    /// Seed the plate bracket from plate-eligible finishers.
    ///
    /// Fewer than 2 eligible participants yields an empty, zero-size document.
    pub fn seed_plate(&self, outcome: &QualificationOutcome) -> BracketResult<SeedDocument> {
        let slots: Vec<SeedSlot> = outcome
            .plate_eligible()
            .map(|r| SeedSlot {
                key: SeedSlot::slot_key(&r.pool_key, r.pool_rank),
                participant: r.participant.clone(),
                pool_key: r.pool_key.clone(),
                pool_rank: r.pool_rank,
            })
            .collect();

        if slots.len() < 2 {
            log::info!(
                "Plate bracket for {} has {} eligible participant(s), writing empty seed document",
                self.division,
                slots.len()
            );
            return Ok(SeedDocument::empty(
                self.document_id(BracketType::Plate),
                BracketType::Plate,
            ));
        }

        self.build(BracketType::Plate, slots, PairingPolicy::Fold)
    }

    fn build(
        &self,
        bracket_type: BracketType,
        mut slots: Vec<SeedSlot>,
        policy: PairingPolicy,
    ) -> BracketResult<SeedDocument> {
        // Seed priority: rank ascending, then pool label.
        slots.sort_by(|a, b| {
            a.pool_rank
                .cmp(&b.pool_rank)
                .then_with(|| compare_pool_labels(&a.pool_key, &b.pool_key))
        });

        let slot_count = slots.len();
        let bracket_size = slot_count.next_power_of_two();
        let bye_count = bracket_size - slot_count;
        let (bye_seeds, remaining) = slots.split_at(bye_count);

        if remaining.len() % 2 != 0 {
            return Err(BracketError::OddRemainingSeeds {
                bracket_type,
                slots: slot_count,
                byes: bye_count,
                remaining: remaining.len(),
            });
        }

        let mut pairs = match policy {
            PairingPolicy::Winners | PairingPolicy::Fold => {
                fold(&(0..remaining.len()).collect::<Vec<_>>())
            }
            PairingPolicy::WinnersAndRunnersUp => {
                pair_winners_and_runners_up(remaining, &pool_labels(&slots))
            }
        };

        let swaps = avoid_same_pool(&mut pairs, remaining);
        if swaps > 0 {
            log::debug!(
                "Seeding {} {} bracket: {} same-pool swap(s)",
                self.division,
                bracket_type,
                swaps
            );
        }

        let round1_pairs: Vec<SeedPair> = bye_seeds
            .iter()
            .map(|s| SeedPair {
                side_a: s.key.clone(),
                side_b: None,
            })
            .chain(pairs.iter().map(|&(a, b)| SeedPair {
                side_a: remaining[a].key.clone(),
                side_b: Some(remaining[b].key.clone()),
            }))
            .collect();

        if round1_pairs.len() != bracket_size / 2 {
            return Err(BracketError::PairCountMismatch {
                bracket_type,
                expected: bracket_size / 2,
                actual: round1_pairs.len(),
                byes: bye_count,
                real: pairs.len(),
            });
        }

        let document = SeedDocument {
            id: self.document_id(bracket_type),
            bracket_type,
            bracket_size: bracket_size as u32,
            round_count: bracket_size.trailing_zeros(),
            round1_match_count: (bracket_size / 2) as u32,
            bye_count: bye_count as u32,
            slots: slots.into_iter().map(|s| (s.key.clone(), s)).collect::<BTreeMap<_, _>>(),
            round1_pairs,
        };

        validate_seed_document(&document)?;
        Ok(document)
    }
}

/// Sorted, de-duplicated pool labels of every seeded slot
fn pool_labels(slots: &[SeedSlot]) -> Vec<String> {
    let mut labels: Vec<String> = slots
        .iter()
        .map(|s| s.pool_key.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    labels.sort_by(|a, b| compare_pool_labels(a, b));
    labels
}

/// Pair first with last, second with second-to-last, ...
fn fold(indices: &[usize]) -> Vec<(usize, usize)> {
    let n = indices.len();
    (0..n / 2).map(|i| (indices[i], indices[n - 1 - i])).collect()
}

/// Four-pass greedy pairing of pool winners against runners-up.
///
/// 1. Mirror pools: fold the label list at its midpoint and pair a pool's
///    winner with its mirror pool's runner-up.
/// 2. Any winner against any runner-up, preferring a different pool.
/// 3. Leftover winners folded together.
/// 4. Leftover runners-up folded together.
fn pair_winners_and_runners_up(remaining: &[SeedSlot], labels: &[String]) -> Vec<(usize, usize)> {
    let mut winners: Vec<usize> = (0..remaining.len())
        .filter(|&i| remaining[i].pool_rank == 1)
        .collect();
    let mut runners_up: Vec<usize> = (0..remaining.len())
        .filter(|&i| remaining[i].pool_rank != 1)
        .collect();
    let mut pairs = Vec::with_capacity(remaining.len() / 2);

    let n = labels.len();
    for (i, label) in labels.iter().enumerate() {
        let mirror = &labels[n - 1 - i];
        if mirror == label {
            continue;
        }
        let Some(w) = winners.iter().position(|&s| remaining[s].pool_key == *label) else {
            continue;
        };
        let Some(r) = runners_up
            .iter()
            .position(|&s| remaining[s].pool_key == *mirror)
        else {
            continue;
        };
        pairs.push((winners.remove(w), runners_up.remove(r)));
    }

    let mut leftover_winners = Vec::new();
    for w in winners {
        if runners_up.is_empty() {
            leftover_winners.push(w);
            continue;
        }
        let pick = runners_up
            .iter()
            .position(|&r| remaining[r].pool_key != remaining[w].pool_key)
            .unwrap_or(0);
        pairs.push((w, runners_up.remove(pick)));
    }

    pairs.extend(fold(&leftover_winners));
    pairs.extend(fold(&runners_up));
    pairs
}

/// Single best-effort pass: for each same-pool pair, swap side B with a later
/// pair's side B when neither resulting pair is same-pool. Returns swaps made.
fn avoid_same_pool(pairs: &mut [(usize, usize)], remaining: &[SeedSlot]) -> usize {
    let pool = |i: usize| remaining[i].pool_key.as_str();
    let mut swaps = 0;

    for i in 0..pairs.len() {
        let (a_i, b_i) = pairs[i];
        if pool(a_i) != pool(b_i) {
            continue;
        }

        for j in i + 1..pairs.len() {
            let (a_j, b_j) = pairs[j];
            if pool(a_i) != pool(b_j) && pool(a_j) != pool(b_i) {
                pairs[i].1 = b_j;
                pairs[j].1 = b_i;
                swaps += 1;
                break;
            }
        }
    }

    swaps
}

/// Check the structural invariants of a seed document.
///
/// # Errors
///
/// * `BracketError::PairCountMismatch` - `round1_pairs` is not `bracket_size / 2` long
/// * `BracketError::DanglingSlot` - A pair references a key missing from `slots`
/// * `BracketError::InvalidSeedDocument` - Any other broken invariant
pub fn validate_seed_document(document: &SeedDocument) -> BracketResult<()> {
    let invalid = |reason: String| BracketError::InvalidSeedDocument(document.id.clone(), reason);

    if document.is_empty() {
        if !document.round1_pairs.is_empty() {
            return Err(invalid(format!(
                "zero-size bracket carries {} pair(s)",
                document.round1_pairs.len()
            )));
        }
        return Ok(());
    }

    let size = document.bracket_size as usize;
    let slot_count = document.slot_count();

    if !size.is_power_of_two() || size != slot_count.next_power_of_two() {
        return Err(invalid(format!(
            "bracket size {size} does not fit {slot_count} slot(s)"
        )));
    }
    if document.bye_count as usize != size - slot_count {
        return Err(invalid(format!(
            "bye count {} but {} slot(s) in a {}-bracket",
            document.bye_count, slot_count, size
        )));
    }
    if document.round_count != size.trailing_zeros() {
        return Err(invalid(format!(
            "round count {} for bracket size {}",
            document.round_count, size
        )));
    }

    let bye_pairs = document.round1_pairs.iter().filter(|p| p.is_bye()).count();
    if document.round1_pairs.len() != size / 2 {
        return Err(BracketError::PairCountMismatch {
            bracket_type: document.bracket_type,
            expected: size / 2,
            actual: document.round1_pairs.len(),
            byes: bye_pairs,
            real: document.round1_pairs.len() - bye_pairs,
        });
    }
    if bye_pairs != document.bye_count as usize {
        return Err(invalid(format!(
            "{bye_pairs} bye pair(s) but bye count {}",
            document.bye_count
        )));
    }

    let mut used = HashSet::new();
    for (pair_index, pair) in document.round1_pairs.iter().enumerate() {
        for key in std::iter::once(&pair.side_a).chain(pair.side_b.as_ref()) {
            if !document.slots.contains_key(key) {
                return Err(BracketError::DanglingSlot {
                    pair_index,
                    slot_key: key.clone(),
                });
            }
            if !used.insert(key.as_str()) {
                return Err(invalid(format!("slot {key} paired more than once")));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::qualifier::{PoolQualification, Qualifier, Remainder};
    use crate::division::{DefaultIdStrategy, ParticipantRef};

    fn participant(id: &str) -> ParticipantRef {
        ParticipantRef {
            id: id.to_string(),
            name: format!("Team {id}"),
        }
    }

    fn outcome(pools: usize, per_pool: u32, plate_per_pool: u32) -> QualificationOutcome {
        let pools = (0..pools)
            .map(|i| {
                let key = ((b'A' + i as u8) as char).to_string();
                PoolQualification {
                    pool_key: key.clone(),
                    qualifiers: (1..=per_pool)
                        .map(|rank| Qualifier {
                            participant: participant(&format!("{key}{rank}")),
                            pool_key: key.clone(),
                            pool_rank: rank,
                            wildcard: false,
                        })
                        .collect(),
                    remainder: (per_pool + 1..=per_pool + plate_per_pool)
                        .map(|rank| Remainder {
                            participant: participant(&format!("{key}{rank}")),
                            pool_key: key.clone(),
                            pool_rank: rank,
                            plate_eligible: true,
                        })
                        .collect(),
                }
            })
            .collect();
        QualificationOutcome {
            max_seed_rank: per_pool,
            pools,
        }
    }

    fn seed_main(outcome: &QualificationOutcome) -> BracketResult<SeedDocument> {
        let division = DivisionKey::new("t", "d");
        BracketSeeder::new(&DefaultIdStrategy, &division).seed_main(outcome)
    }

    fn seed_plate(outcome: &QualificationOutcome) -> BracketResult<SeedDocument> {
        let division = DivisionKey::new("t", "d");
        BracketSeeder::new(&DefaultIdStrategy, &division).seed_plate(outcome)
    }

    fn real_pairs(document: &SeedDocument) -> Vec<(String, String)> {
        document
            .round1_pairs
            .iter()
            .filter_map(|p| p.side_b.as_ref().map(|b| (p.side_a.clone(), b.clone())))
            .collect()
    }

    #[test]
    fn test_five_pools_top_two() {
        let document = seed_main(&outcome(5, 2, 0)).unwrap();

        assert_eq!(document.slot_count(), 10);
        assert_eq!(document.bracket_size, 16);
        assert_eq!(document.bye_count, 6);
        assert_eq!(document.round_count, 4);
        assert_eq!(document.round1_match_count, 8);
        assert_eq!(document.round1_pairs.len(), 8);

        let byes: Vec<_> = document.round1_pairs[..6]
            .iter()
            .map(|p| {
                assert!(p.is_bye());
                p.side_a.as_str()
            })
            .collect();
        assert_eq!(byes, vec!["A1", "B1", "C1", "D1", "E1", "A2"]);

        assert_eq!(
            real_pairs(&document),
            vec![
                ("B2".to_string(), "E2".to_string()),
                ("C2".to_string(), "D2".to_string())
            ]
        );
    }

    #[test]
    fn test_four_pools_top_two_uses_mirror_pairing() {
        // 8 slots, no byes; mirror A<->D, B<->C
        let document = seed_main(&outcome(4, 2, 0)).unwrap();
        assert_eq!(document.bye_count, 0);
        assert_eq!(
            real_pairs(&document),
            vec![
                ("A1".to_string(), "D2".to_string()),
                ("B1".to_string(), "C2".to_string()),
                ("C1".to_string(), "B2".to_string()),
                ("D1".to_string(), "A2".to_string()),
            ]
        );
    }

    #[test]
    fn test_three_pools_top_two_avoids_same_pool() {
        // 6 slots → size 8, 2 byes (A1, B1); remaining C1, A2, B2, C2.
        // Mirror A<->C: A1 taken by bye, C1 vs A2.
        let document = seed_main(&outcome(3, 2, 0)).unwrap();
        assert_eq!(document.bye_count, 2);

        let pairs = real_pairs(&document);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("C1".to_string(), "A2".to_string()));
        for (a, b) in &pairs {
            assert_ne!(a[..1], b[..1], "same-pool pairing {a} vs {b}");
        }
    }

    #[test]
    fn test_top_one_folds_winners() {
        // 6 winners → 8-bracket, byes A1 and B1, remaining C1..F1 folded
        let document = seed_main(&outcome(6, 1, 0)).unwrap();
        assert_eq!(document.bye_count, 2);
        assert_eq!(
            real_pairs(&document),
            vec![
                ("C1".to_string(), "F1".to_string()),
                ("D1".to_string(), "E1".to_string())
            ]
        );
    }

    #[test]
    fn test_power_of_two_has_no_byes() {
        let document = seed_main(&outcome(2, 2, 0)).unwrap();
        assert_eq!(document.bracket_size, 4);
        assert_eq!(document.bye_count, 0);
        assert_eq!(document.round1_pairs.len(), 2);
        assert!(document.round1_pairs.iter().all(|p| !p.is_bye()));
    }

    #[test]
    fn test_too_few_qualifiers() {
        assert_eq!(
            seed_main(&outcome(1, 1, 0)),
            Err(BracketError::TooFewQualifiers(1))
        );
    }

    #[test]
    fn test_plate_orders_by_rank_then_pool() {
        // 3 pools x 2 plate finishers (ranks 3, 4) → 6 slots, 2 byes to A3, B3
        let document = seed_plate(&outcome(3, 2, 2)).unwrap();
        assert_eq!(document.bracket_type, BracketType::Plate);
        assert_eq!(document.bracket_size, 8);
        assert_eq!(document.round1_pairs[0].side_a, "A3");
        assert_eq!(document.round1_pairs[1].side_a, "B3");

        // Remaining C3, A4, B4, C4 folded: C3-C4 is same-pool and gets swapped
        let pairs = real_pairs(&document);
        assert_eq!(
            pairs,
            vec![
                ("C3".to_string(), "B4".to_string()),
                ("A4".to_string(), "C4".to_string())
            ]
        );
    }

    #[test]
    fn test_plate_with_one_eligible_is_empty() {
        let document = seed_plate(&outcome(1, 2, 1)).unwrap();
        assert!(document.is_empty());
        assert_eq!(document.bracket_size, 0);
        assert!(document.round1_pairs.is_empty());
        assert!(validate_seed_document(&document).is_ok());
    }

    #[test]
    fn test_validate_detects_dangling_slot() {
        let mut document = seed_main(&outcome(4, 1, 0)).unwrap();
        document.round1_pairs[0].side_b = Some("Z9".to_string());
        assert_eq!(
            validate_seed_document(&document),
            Err(BracketError::DanglingSlot {
                pair_index: 0,
                slot_key: "Z9".to_string()
            })
        );
    }

    #[test]
    fn test_validate_detects_pair_count_mismatch() {
        let mut document = seed_main(&outcome(4, 1, 0)).unwrap();
        document.round1_pairs.pop();
        assert!(matches!(
            validate_seed_document(&document),
            Err(BracketError::PairCountMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_avoid_same_pool_swaps_with_later_pair() {
        let slots: Vec<SeedSlot> = [("A", 1), ("A", 2), ("B", 1), ("B", 2)]
            .iter()
            .map(|&(pool, rank)| SeedSlot {
                key: SeedSlot::slot_key(pool, rank),
                participant: participant(&format!("{pool}{rank}")),
                pool_key: pool.to_string(),
                pool_rank: rank,
            })
            .collect();
        let mut pairs = vec![(0, 1), (2, 3)];

        assert_eq!(avoid_same_pool(&mut pairs, &slots), 1);
        assert_eq!(pairs, vec![(0, 3), (2, 1)]);
    }
}
