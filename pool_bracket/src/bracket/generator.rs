//! Expansion of a seed document into the linked single-elimination match tree.

use std::collections::HashMap;

use super::errors::{BracketError, BracketResult};
use super::position_index::{BracketPosition, PositionIndex, TempId};
use super::seeder::validate_seed_document;
use crate::division::{
    DivisionKey, IdStrategy, Match, MatchResult, MatchSide, MatchStatus, RoundScoring,
    SeedDocument, Slot, Stage,
};

/// Match laid out with temporary ids, before canonical ids are attached
#[derive(Debug)]
struct Draft {
    temp: TempId,
    round: u32,
    position: u32,
    side_a: MatchSide,
    side_b: MatchSide,
    next: Option<(TempId, Slot)>,
    loser_next: Option<(TempId, Slot)>,
    is_bronze: bool,
}

pub struct BracketMatchGenerator<'a> {
    ids: &'a dyn IdStrategy,
    scoring: &'a RoundScoring,
    bronze: bool,
}

impl<'a> BracketMatchGenerator<'a> {
    pub fn new(ids: &'a dyn IdStrategy, scoring: &'a RoundScoring, bronze: bool) -> Self {
        Self {
            ids,
            scoring,
            bronze,
        }
    }

    /// Build every match of the bracket described by `document`.
    ///
    /// Output is ordered by round, then position, with the bronze match last.
    /// The same document always produces identical matches.
    ///
    /// # Arguments
    ///
    /// * `division` - Owning division
    /// * `document` - Validated seed document; a zero-size document yields no matches
    ///
    /// # Errors
    ///
    /// * Consistency errors for a malformed document or an unresolved temp id
    pub fn generate(
        &self,
        division: &DivisionKey,
        document: &SeedDocument,
    ) -> BracketResult<Vec<Match>> {
        validate_seed_document(document)?;
        if document.is_empty() {
            return Ok(Vec::new());
        }

        let round_count = document.round_count;
        let with_bronze = self.bronze && round_count >= 2;
        let index = PositionIndex::build(
            self.ids,
            division,
            document.bracket_type,
            document.bracket_size,
            with_bronze,
        );

        let drafts = self.lay_out(document, &index, with_bronze)?;

        let mut matches = drafts
            .into_iter()
            .map(|draft| self.materialize(division, document, &index, draft))
            .collect::<BracketResult<Vec<_>>>()?;

        apply_bye_advancement(&mut matches);
        Ok(matches)
    }

    fn lay_out(
        &self,
        document: &SeedDocument,
        index: &PositionIndex,
        with_bronze: bool,
    ) -> BracketResult<Vec<Draft>> {
        let round_count = document.round_count;
        let mut drafts = Vec::with_capacity(index.len());

        for (i, pair) in document.round1_pairs.iter().enumerate() {
            let position = i as u32 + 1;
            let side_b = match &pair.side_b {
                Some(key) => participant_side(document, i, key)?,
                None => MatchSide::Bye,
            };
            drafts.push(Draft {
                temp: index.temp_id(BracketPosition::Slot { round: 1, position })?,
                round: 1,
                position,
                side_a: participant_side(document, i, &pair.side_a)?,
                side_b,
                next: None,
                loser_next: None,
                is_bronze: false,
            });
        }

        for round in 2..=round_count {
            let matches_in_round = document.bracket_size >> round;
            for position in 1..=matches_in_round {
                drafts.push(Draft {
                    temp: index.temp_id(BracketPosition::Slot { round, position })?,
                    round,
                    position,
                    side_a: MatchSide::Tbd,
                    side_b: MatchSide::Tbd,
                    next: None,
                    loser_next: None,
                    is_bronze: false,
                });
            }
        }

        // Winner links: positions (2i-1, 2i) feed position i of the next round.
        for draft in drafts.iter_mut().filter(|d| d.round < round_count) {
            let next_position = draft.position.div_ceil(2);
            let slot = if draft.position % 2 == 1 { Slot::A } else { Slot::B };
            let next = index.temp_id(BracketPosition::Slot {
                round: draft.round + 1,
                position: next_position,
            })?;
            draft.next = Some((next, slot));
        }

        if with_bronze {
            let bronze = index.temp_id(BracketPosition::Bronze)?;
            let semifinal_round = round_count - 1;

            for draft in drafts.iter_mut().filter(|d| d.round == semifinal_round) {
                let slot = if draft.position == 1 { Slot::A } else { Slot::B };
                draft.loser_next = Some((bronze, slot));
            }

            drafts.push(Draft {
                temp: bronze,
                round: round_count,
                position: 2,
                side_a: MatchSide::Tbd,
                side_b: MatchSide::Tbd,
                next: None,
                loser_next: None,
                is_bronze: true,
            });
        }

        if drafts.len() != index.len() {
            return Err(BracketError::InvalidSeedDocument(
                document.id.clone(),
                format!(
                    "laid out {} match(es) for {} indexed position(s)",
                    drafts.len(),
                    index.len()
                ),
            ));
        }

        Ok(drafts)
    }

    fn materialize(
        &self,
        division: &DivisionKey,
        document: &SeedDocument,
        index: &PositionIndex,
        draft: Draft,
    ) -> BracketResult<Match> {
        let resolve_link = |link: Option<(TempId, Slot)>| -> BracketResult<_> {
            match link {
                Some((temp, slot)) => Ok((Some(index.resolve(temp)?), Some(slot))),
                None => Ok((None, None)),
            }
        };

        let (next_match_id, next_match_slot) = resolve_link(draft.next)?;
        let (loser_next_match_id, loser_next_match_slot) = resolve_link(draft.loser_next)?;

        let scoring = if draft.is_bronze {
            self.scoring.for_bronze()
        } else {
            self.scoring.for_distance(document.round_count - draft.round)
        };

        // A BYE is decided on creation.
        let (status, result) = if draft.round == 1 && draft.side_b.is_bye() {
            (MatchStatus::Completed, Some(MatchResult::bye(Slot::A)))
        } else {
            (MatchStatus::Scheduled, None)
        };

        Ok(Match {
            id: index.resolve(draft.temp)?,
            division: division.clone(),
            stage: Stage::Bracket,
            bracket_type: Some(document.bracket_type),
            pool_key: None,
            round: draft.round,
            position: draft.position,
            side_a: draft.side_a,
            side_b: draft.side_b,
            next_match_id,
            next_match_slot,
            loser_next_match_id,
            loser_next_match_slot,
            is_bronze: draft.is_bronze,
            status,
            result,
            scoring,
        })
    }
}

fn participant_side(
    document: &SeedDocument,
    pair_index: usize,
    slot_key: &str,
) -> BracketResult<MatchSide> {
    document
        .slots
        .get(slot_key)
        .map(|slot| MatchSide::Participant(slot.participant.clone()))
        .ok_or_else(|| BracketError::DanglingSlot {
            pair_index,
            slot_key: slot_key.to_string(),
        })
}

/// Push every BYE winner into its linked next-match slot.
///
/// A slot is only written while it is still TBD, so repeated or out-of-order
/// passes never clobber a participant placed by a real result.
/// Returns the number of slots filled.
pub fn apply_bye_advancement(matches: &mut [Match]) -> usize {
    let positions: HashMap<String, usize> = matches
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.clone(), i))
        .collect();

    let advancements: Vec<(usize, Slot, MatchSide)> = matches
        .iter()
        .filter(|m| m.is_bye() && m.has_finalized_result())
        .filter_map(|m| {
            let winner = m.winner()?.clone();
            let target = *positions.get(m.next_match_id.as_ref()?)?;
            Some((target, m.next_match_slot?, MatchSide::Participant(winner)))
        })
        .collect();

    let mut filled = 0;
    for (target, slot, side) in advancements {
        let next = &mut matches[target];
        if next.side(slot).is_tbd() {
            *next.side_mut(slot) = side;
            filled += 1;
        } else if next.side(slot) != &side {
            log::warn!(
                "Skipping BYE advancement into {} slot {:?}: already occupied",
                next.id,
                slot
            );
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::qualifier::{PoolQualification, QualificationOutcome, Qualifier};
    use crate::bracket::seeder::BracketSeeder;
    use crate::division::{BracketType, DefaultIdStrategy, ParticipantRef, ScoringConfig};

    fn division() -> DivisionKey {
        DivisionKey::new("t", "open")
    }

    fn outcome(pools: usize, per_pool: u32) -> QualificationOutcome {
        QualificationOutcome {
            max_seed_rank: per_pool,
            pools: (0..pools)
                .map(|i| {
                    let key = ((b'A' + i as u8) as char).to_string();
                    PoolQualification {
                        pool_key: key.clone(),
                        qualifiers: (1..=per_pool)
                            .map(|rank| Qualifier {
                                participant: ParticipantRef {
                                    id: format!("{key}{rank}"),
                                    name: format!("Team {key}{rank}"),
                                },
                                pool_key: key.clone(),
                                pool_rank: rank,
                                wildcard: false,
                            })
                            .collect(),
                        remainder: Vec::new(),
                    }
                })
                .collect(),
        }
    }

    fn seed(pools: usize, per_pool: u32) -> SeedDocument {
        BracketSeeder::new(&DefaultIdStrategy, &division())
            .seed_main(&outcome(pools, per_pool))
            .unwrap()
    }

    fn generate(document: &SeedDocument, bronze: bool) -> Vec<Match> {
        let scoring = RoundScoring::default();
        BracketMatchGenerator::new(&DefaultIdStrategy, &scoring, bronze)
            .generate(&division(), document)
            .unwrap()
    }

    fn find<'m>(matches: &'m [Match], id: &str) -> &'m Match {
        matches.iter().find(|m| m.id == id).unwrap()
    }

    #[test]
    fn test_scenario_five_pools_top_two() {
        let document = seed(5, 2);
        let matches = generate(&document, false);

        // 8 + 4 + 2 + 1
        assert_eq!(matches.len(), 15);

        let round1: Vec<_> = matches.iter().filter(|m| m.round == 1).collect();
        assert_eq!(round1.len(), 8);
        assert_eq!(round1.iter().filter(|m| m.is_bye()).count(), 6);
        assert!(
            round1
                .iter()
                .filter(|m| m.is_bye())
                .all(|m| m.status == MatchStatus::Completed)
        );
        assert_eq!(
            round1
                .iter()
                .filter(|m| m.status == MatchStatus::Scheduled)
                .count(),
            2
        );

        // Byes at positions 1..6 fill both sides of r2m1..r2m3
        for position in 1..=3 {
            let m = find(&matches, &format!("open_main_r2m{position}"));
            assert!(m.side_a.participant().is_some());
            assert!(m.side_b.participant().is_some());
        }
        let r2m4 = find(&matches, "open_main_r2m4");
        assert!(r2m4.side_a.is_tbd());
        assert!(r2m4.side_b.is_tbd());

        let r2m1 = find(&matches, "open_main_r2m1");
        assert_eq!(r2m1.side_a.participant().unwrap().id, "A1");
        assert_eq!(r2m1.side_b.participant().unwrap().id, "B1");
    }

    #[test]
    fn test_winner_links() {
        let matches = generate(&seed(8, 1), false);

        let r1m1 = find(&matches, "open_main_r1m1");
        assert_eq!(r1m1.next_match_id.as_deref(), Some("open_main_r2m1"));
        assert_eq!(r1m1.next_match_slot, Some(Slot::A));

        let r1m2 = find(&matches, "open_main_r1m2");
        assert_eq!(r1m2.next_match_id.as_deref(), Some("open_main_r2m1"));
        assert_eq!(r1m2.next_match_slot, Some(Slot::B));

        let r1m4 = find(&matches, "open_main_r1m4");
        assert_eq!(r1m4.next_match_id.as_deref(), Some("open_main_r2m2"));
        assert_eq!(r1m4.next_match_slot, Some(Slot::B));

        let final_match = find(&matches, "open_main_r3m1");
        assert!(final_match.next_match_id.is_none());
        assert!(matches.iter().all(|m| m.loser_next_match_id.is_none()));
    }

    #[test]
    fn test_bronze_takes_semifinal_losers() {
        let matches = generate(&seed(8, 1), true);
        assert_eq!(matches.len(), 8);

        let bronze = matches.last().unwrap();
        assert!(bronze.is_bronze);
        assert_eq!(bronze.id, "open_main_bronze");
        assert!(bronze.next_match_id.is_none());

        let semi1 = find(&matches, "open_main_r2m1");
        assert_eq!(semi1.loser_next_match_id.as_deref(), Some("open_main_bronze"));
        assert_eq!(semi1.loser_next_match_slot, Some(Slot::A));
        assert_eq!(semi1.next_match_id.as_deref(), Some("open_main_r3m1"));

        let semi2 = find(&matches, "open_main_r2m2");
        assert_eq!(semi2.loser_next_match_slot, Some(Slot::B));
    }

    #[test]
    fn test_two_entrants_skip_bronze() {
        let matches = generate(&seed(2, 1), true);
        assert_eq!(matches.len(), 1);
        assert!(!matches[0].is_bronze);
    }

    #[test]
    fn test_scoring_by_distance_from_final() {
        let final_scoring = ScoringConfig {
            best_of: 3,
            ..ScoringConfig::default()
        };
        let bronze_scoring = ScoringConfig {
            points_to_win: 15,
            ..ScoringConfig::default()
        };
        let scoring = RoundScoring {
            final_round: Some(final_scoring),
            bronze: Some(bronze_scoring),
            ..RoundScoring::default()
        };

        let matches = BracketMatchGenerator::new(&DefaultIdStrategy, &scoring, true)
            .generate(&division(), &seed(8, 1))
            .unwrap();

        assert_eq!(find(&matches, "open_main_r3m1").scoring, final_scoring);
        assert_eq!(find(&matches, "open_main_bronze").scoring, bronze_scoring);
        assert_eq!(
            find(&matches, "open_main_r2m1").scoring,
            ScoringConfig::default()
        );
    }

    #[test]
    fn test_generation_is_idempotent() {
        let document = seed(5, 2);
        assert_eq!(generate(&document, true), generate(&document, true));
    }

    #[test]
    fn test_empty_document_yields_no_matches() {
        let document = SeedDocument::empty("open_seed-plate_doc".to_string(), BracketType::Plate);
        assert!(generate(&document, true).is_empty());
    }

    #[test]
    fn test_bye_advancement_never_overwrites() {
        let mut matches = generate(&seed(3, 1), false);
        // 3 entrants: A1 has a bye into r2m1 slot A
        let r2m1 = matches
            .iter()
            .position(|m| m.id == "open_main_r2m1")
            .unwrap();
        assert_eq!(matches[r2m1].side_a.participant().unwrap().id, "A1");

        let intruder = MatchSide::Participant(ParticipantRef {
            id: "X".to_string(),
            name: "Team X".to_string(),
        });
        matches[r2m1].side_a = intruder.clone();

        assert_eq!(apply_bye_advancement(&mut matches), 0);
        assert_eq!(matches[r2m1].side_a, intruder);
    }

    #[test]
    fn test_bye_advancement_is_repeatable() {
        let mut matches = generate(&seed(5, 2), false);
        let before = matches.clone();
        assert_eq!(apply_bye_advancement(&mut matches), 0);
        assert_eq!(matches, before);
    }

    #[test]
    fn test_dangling_slot_is_rejected() {
        let mut document = seed(4, 1);
        document.slots.remove("A1");
        let scoring = RoundScoring::default();
        let result = BracketMatchGenerator::new(&DefaultIdStrategy, &scoring, false)
            .generate(&division(), &document);
        assert!(result.is_err());
    }
}
