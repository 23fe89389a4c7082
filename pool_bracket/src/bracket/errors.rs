//! Bracket and schedule error types.

use crate::division::{BracketType, MatchId};
use thiserror::Error;

/// Broad class of a failure, used to pick a response and a log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input from the organizer; fixable by changing setup
    Config,
    /// Internal invariant broken; a bug
    Consistency,
    /// Guard refused to mutate state in its current shape
    Precondition,
}

/// Errors raised by the pure scheduling and seeding algorithms
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BracketError {
    #[error("No pools assigned: assign participants to at least one pool before generating")]
    EmptyPoolAssignment,

    #[error("Pool {pool_key} has {size} participant(s); every pool needs at least 2")]
    PoolTooSmall { pool_key: String, size: usize },

    #[error("Pool name {0:?} has no letters or digits to derive a pool key from")]
    EmptyPoolKey(String),

    #[error("Pool key {0} is used by more than one pool")]
    DuplicatePoolKey(String),

    #[error("Participant {participant_id} appears in pools {first_pool} and {second_pool}")]
    DuplicateParticipant {
        participant_id: String,
        first_pool: String,
        second_pool: String,
    },

    #[error("Unsupported advancement rule {rule}: {reason}")]
    UnsupportedAdvancement { rule: String, reason: String },

    #[error("Main bracket needs at least 2 qualifiers, found {0}")]
    TooFewQualifiers(usize),

    #[error(
        "Pool stage incomplete: {count} pairing(s) outstanding; not finished: [{}]; never scheduled: [{}]",
        blocking.join(", "),
        unscheduled.join(", ")
    )]
    PoolStageIncomplete {
        count: usize,
        /// Stored pool matches without a finalized result
        blocking: Vec<MatchId>,
        /// Pairings of the current assignment with no stored match
        unscheduled: Vec<MatchId>,
    },

    #[error("No standings supplied for pool {0}")]
    MissingStandings(String),

    #[error(
        "Odd remaining seed count in {bracket_type} bracket: {remaining} remaining after {byes} bye(s) from {slots} slot(s)"
    )]
    OddRemainingSeeds {
        bracket_type: BracketType,
        slots: usize,
        byes: usize,
        remaining: usize,
    },

    #[error(
        "Round 1 pair count mismatch in {bracket_type} bracket: expected {expected}, built {actual} ({byes} bye pair(s), {real} real pair(s))"
    )]
    PairCountMismatch {
        bracket_type: BracketType,
        expected: usize,
        actual: usize,
        byes: usize,
        real: usize,
    },

    #[error("Seed pair {pair_index} references unknown slot {slot_key}")]
    DanglingSlot { pair_index: usize, slot_key: String },

    #[error("Seed document {0} is inconsistent: {1}")]
    InvalidSeedDocument(String, String),

    #[error("Unresolved temporary match id {temp_id} while linking {context}")]
    UnresolvedTempId { temp_id: u32, context: String },

    #[error("Canonical id {0} was derived for more than one match")]
    DuplicateMatchId(MatchId),
}

impl BracketError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BracketError::EmptyPoolAssignment
            | BracketError::PoolTooSmall { .. }
            | BracketError::EmptyPoolKey(_)
            | BracketError::DuplicatePoolKey(_)
            | BracketError::DuplicateParticipant { .. }
            | BracketError::UnsupportedAdvancement { .. }
            | BracketError::TooFewQualifiers(_) => ErrorCategory::Config,
            BracketError::PoolStageIncomplete { .. } | BracketError::MissingStandings(_) => {
                ErrorCategory::Precondition
            }
            BracketError::OddRemainingSeeds { .. }
            | BracketError::PairCountMismatch { .. }
            | BracketError::DanglingSlot { .. }
            | BracketError::InvalidSeedDocument(..)
            | BracketError::UnresolvedTempId { .. }
            | BracketError::DuplicateMatchId(_) => ErrorCategory::Consistency,
        }
    }
}

/// Result type for bracket operations
pub type BracketResult<T> = Result<T, BracketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stage_incomplete_lists_blockers() {
        let err = BracketError::PoolStageIncomplete {
            count: 3,
            blocking: vec!["m1".to_string(), "m7".to_string()],
            unscheduled: vec!["m9".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("3 pairing(s)"));
        assert!(msg.contains("not finished: [m1, m7]"));
        assert!(msg.contains("never scheduled: [m9]"));
        assert_eq!(err.category(), ErrorCategory::Precondition);
    }

    #[test]
    fn test_consistency_category() {
        let err = BracketError::OddRemainingSeeds {
            bracket_type: BracketType::Main,
            slots: 7,
            byes: 2,
            remaining: 5,
        };
        assert_eq!(err.category(), ErrorCategory::Consistency);
        assert!(err.to_string().contains("5 remaining"));
    }
}
