//! Recording match results and advancing winners (and semifinal losers).
//!
//! The result and every advancement go out in one batch of field patches,
//! applied against the stored documents inside the commit. The standings
//! refresh for pool matches runs afterwards on any result change and cannot
//! undo or fail the completion.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::errors::{GenerationError, GenerationResult};
use super::lock::{Clock, SystemClock};
use crate::db::{DivisionStore, MatchPatch, StoreError, WriteBatch};
use crate::division::{
    DivisionKey, GameScore, Match, MatchId, MatchResult, MatchSide, MatchStatus, ParticipantRef,
    ResultKind, Slot, Stage,
};
use crate::standings::{ProjectionOutcome, RetryPolicy, StandingsProjector};

/// Result submitted by an organizer or scorekeeper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub winner: Slot,
    #[serde(default = "played")]
    pub kind: ResultKind,
    #[serde(default)]
    pub games: Vec<GameScore>,
    /// Only finalized results advance winners and count in standings
    #[serde(default = "finalized_by_default")]
    pub finalized: bool,
}

fn played() -> ResultKind {
    ResultKind::Played
}

fn finalized_by_default() -> bool {
    true
}

impl ResultSubmission {
    pub fn played(winner: Slot, games: Vec<GameScore>) -> Self {
        Self {
            winner,
            kind: ResultKind::Played,
            games,
            finalized: true,
        }
    }

    pub fn forfeit(winner: Slot) -> Self {
        Self {
            winner,
            kind: ResultKind::Forfeit,
            games: Vec::new(),
            finalized: true,
        }
    }
}

/// What a completion wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub match_id: MatchId,
    pub status: MatchStatus,
    /// Match that received the winner
    pub advanced_to: Option<MatchId>,
    /// Match that received the loser (bronze)
    pub loser_to: Option<MatchId>,
    /// True when the match already had a result that this one replaced
    pub overwrote_previous: bool,
    /// Standings refresh outcome for pool matches
    pub standings: Option<ProjectionOutcome>,
}

pub struct MatchCompletion {
    store: Arc<dyn DivisionStore>,
    clock: Arc<dyn Clock>,
    projector: StandingsProjector,
}

impl MatchCompletion {
    pub fn new(store: Arc<dyn DivisionStore>, retry: RetryPolicy) -> Self {
        Self {
            projector: StandingsProjector::new(store.clone(), retry),
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record a result on a match.
    ///
    /// A finalized result writes the winner into the linked next match and the
    /// loser into the linked bronze match, atomically with the match itself.
    /// Completing an already completed match replaces the earlier result.
    ///
    /// # Errors
    ///
    /// * `GenerationError::MatchNotFound` - No such match
    /// * `GenerationError::InvalidResult` - Match not ready, or result inconsistent
    /// * `GenerationError::Store` - Batch commit failed; nothing was written
    pub async fn complete_match(
        &self,
        division: &DivisionKey,
        match_id: &str,
        submission: ResultSubmission,
    ) -> GenerationResult<CompletionReport> {
        let mut m = self
            .store
            .load_match(division, match_id)
            .await?
            .ok_or_else(|| GenerationError::MatchNotFound {
                division: division.clone(),
                match_id: match_id.to_string(),
            })?;

        validate_submission(&m, &submission)?;

        let overwrote_previous = m.result.is_some();
        if overwrote_previous {
            log::warn!(
                "Match {} in {} already has a result; replacing it (last write wins)",
                m.id,
                division
            );
        }

        let status = match (submission.finalized, submission.kind) {
            (false, _) => MatchStatus::InProgress,
            (true, ResultKind::Forfeit) => MatchStatus::Forfeit,
            (true, _) => MatchStatus::Completed,
        };
        let result = MatchResult {
            winner: submission.winner,
            kind: submission.kind,
            games: submission.games,
            finalized: submission.finalized,
            recorded_at: Some(self.clock.now()),
        };
        let refresh_pool = match m.stage {
            Stage::Pool => m.pool_key.clone(),
            Stage::Bracket => None,
        };

        m.status = status;
        m.result = Some(result.clone());

        // Field patches only; a sibling completion may seat the other side of the same target
        let mut batch = WriteBatch::new();
        batch.patch(MatchPatch::Result {
            match_id: m.id.clone(),
            status,
            result,
        });

        let mut advanced_to = None;
        let mut loser_to = None;

        if submission.finalized {
            if let (Some(winner), Some(next_id), Some(slot)) = (
                m.winner().cloned(),
                m.next_match_id.clone(),
                m.next_match_slot,
            ) {
                batch.patch(self.seat(division, &next_id, slot, winner).await?);
                advanced_to = Some(next_id);
            }

            if let (Some(loser), Some(loser_id), Some(slot)) = (
                m.loser().cloned(),
                m.loser_next_match_id.clone(),
                m.loser_next_match_slot,
            ) {
                batch.patch(self.seat(division, &loser_id, slot, loser).await?);
                loser_to = Some(loser_id);
            }
        }

        self.store
            .commit(division, batch)
            .await
            .map_err(|e| match e {
                StoreError::MissingMatch(match_id) => GenerationError::MatchNotFound {
                    division: division.clone(),
                    match_id,
                },
                other => other.into(),
            })?;

        log::info!(
            "Completed {} in {} ({:?}); winner to {:?}, loser to {:?}",
            match_id,
            division,
            status,
            advanced_to,
            loser_to
        );

        // Any pool result change, downgrades included, can move the table
        let standings = match refresh_pool {
            Some(pool_key) => Some(self.projector.refresh(division, &pool_key).await),
            None => None,
        };

        Ok(CompletionReport {
            match_id: match_id.to_string(),
            status,
            advanced_to,
            loser_to,
            overwrote_previous,
            standings,
        })
    }

    /// Patch placing `participant` into `slot` of `target`
    async fn seat(
        &self,
        division: &DivisionKey,
        target: &str,
        slot: Slot,
        participant: ParticipantRef,
    ) -> GenerationResult<MatchPatch> {
        let next = self
            .store
            .load_match(division, target)
            .await?
            .ok_or_else(|| GenerationError::MatchNotFound {
                division: division.clone(),
                match_id: target.to_string(),
            })?;

        if let Some(existing) = next.side(slot).participant()
            && existing.id != participant.id
        {
            log::warn!(
                "Replacing {} with {} in {} slot {:?}",
                existing.id,
                participant.id,
                next.id,
                slot
            );
        }

        Ok(MatchPatch::Seat {
            match_id: next.id,
            slot,
            side: MatchSide::Participant(participant),
        })
    }
}

fn validate_submission(m: &Match, submission: &ResultSubmission) -> GenerationResult<()> {
    if submission.kind == ResultKind::Bye {
        return Err(GenerationError::InvalidResult(
            "BYE results are created by bracket generation".to_string(),
        ));
    }

    if m.is_bye() {
        return Err(GenerationError::InvalidResult(format!(
            "match {} is a BYE and cannot be completed",
            m.id
        )));
    }

    for slot in [Slot::A, Slot::B] {
        if m.side(slot).participant().is_none() {
            return Err(GenerationError::InvalidResult(format!(
                "match {} is not ready: side {:?} has no participant yet",
                m.id, slot
            )));
        }
    }

    if submission.kind == ResultKind::Played {
        if submission.games.is_empty() {
            return Err(GenerationError::InvalidResult(
                "a played result needs at least one game score".to_string(),
            ));
        }

        let won = |slot: Slot| {
            submission
                .games
                .iter()
                .filter(|g| match slot {
                    Slot::A => g.a > g.b,
                    Slot::B => g.b > g.a,
                })
                .count()
        };
        if won(submission.winner) <= won(submission.winner.other()) {
            return Err(GenerationError::InvalidResult(format!(
                "side {:?} is declared winner but did not win more games",
                submission.winner
            )));
        }

        let best_of = usize::from(m.scoring.best_of.max(1));
        if submission.games.len() > best_of {
            return Err(GenerationError::InvalidResult(format!(
                "{} games submitted for a best-of-{} match",
                submission.games.len(),
                best_of
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::division::{MatchSide, ScoringConfig};

    fn side(id: &str) -> MatchSide {
        MatchSide::Participant(ParticipantRef {
            id: id.to_string(),
            name: id.to_string(),
        })
    }

    fn ready_match(best_of: u8) -> Match {
        Match {
            id: "m".to_string(),
            division: DivisionKey::new("t", "d"),
            stage: Stage::Bracket,
            bracket_type: None,
            pool_key: None,
            round: 1,
            position: 1,
            side_a: side("x"),
            side_b: side("y"),
            next_match_id: None,
            next_match_slot: None,
            loser_next_match_id: None,
            loser_next_match_slot: None,
            is_bronze: false,
            status: MatchStatus::Scheduled,
            result: None,
            scoring: ScoringConfig {
                best_of,
                ..ScoringConfig::default()
            },
        }
    }

    #[test]
    fn test_winner_must_win_more_games() {
        let submission =
            ResultSubmission::played(Slot::B, vec![GameScore::new(21, 15), GameScore::new(10, 21)]);
        assert!(validate_submission(&ready_match(3), &submission).is_err());

        let submission = ResultSubmission::played(
            Slot::B,
            vec![
                GameScore::new(21, 15),
                GameScore::new(10, 21),
                GameScore::new(19, 21),
            ],
        );
        assert!(validate_submission(&ready_match(3), &submission).is_ok());
    }

    #[test]
    fn test_too_many_games() {
        let submission =
            ResultSubmission::played(Slot::A, vec![GameScore::new(21, 15), GameScore::new(21, 3)]);
        assert!(validate_submission(&ready_match(1), &submission).is_err());
    }

    #[test]
    fn test_tbd_side_is_not_ready() {
        let mut m = ready_match(1);
        m.side_b = MatchSide::Tbd;
        let err = validate_submission(&m, &ResultSubmission::forfeit(Slot::A)).unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }

    #[test]
    fn test_forfeit_needs_no_games() {
        assert!(validate_submission(&ready_match(1), &ResultSubmission::forfeit(Slot::B)).is_ok());
    }

    #[test]
    fn test_submission_defaults_from_json() {
        let submission: ResultSubmission =
            serde_json::from_str(r#"{"winner":"A","games":[{"a":21,"b":17}]}"#).unwrap();
        assert_eq!(submission.kind, ResultKind::Played);
        assert!(submission.finalized);
    }
}
