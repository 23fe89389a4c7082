//! Division data model and canonical identifiers.

pub mod ids;
pub mod models;

pub use ids::{Coordinate, DefaultIdStrategy, IdScope, IdStrategy};
pub use models::{
    BracketType, DivisionConfig, DivisionId, DivisionKey, DivisionRecord, GameScore, Match,
    MatchId, MatchResult, MatchSide, MatchStatus, Participant, ParticipantId, ParticipantRef,
    Pool, PoolStandings, ResultKind, RoundScoring, ScoringConfig, SeedDocument, SeedPair,
    SeedSlot, Slot, Stage, StandingRow, TournamentId, compare_pool_labels, normalize_pool_key,
};
