//! Generation and completion error types.

use thiserror::Error;

use super::lock::LockFamily;
use crate::bracket::{BracketError, ErrorCategory};
use crate::db::StoreError;
use crate::division::{BracketType, DivisionKey, MatchId};

/// How a caller should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix the division setup
    Config,
    /// Internal bug
    Consistency,
    /// State does not allow the operation yet
    Precondition,
    /// Another run holds the lock; retry later
    Conflict,
    NotFound,
    /// Storage failure
    Store,
}

/// Errors raised by generation operations and match completion
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Scheduling or seeding algorithm failure
    #[error(transparent)]
    Bracket(BracketError),

    /// Storage failure
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Lock held by another run and not stale
    #[error(
        "{family} generation already in progress for {division}; retry in {retry_after_secs}s"
    )]
    InProgress {
        division: DivisionKey,
        family: LockFamily,
        retry_after_secs: u64,
    },

    /// Some pool pairings are unscheduled or have no finalized result
    #[error(
        "Pool stage incomplete: {} match(es) not finalized: [{}]; {} pairing(s) never scheduled: [{}]",
        blocking.len(),
        blocking.join(", "),
        unscheduled.len(),
        unscheduled.join(", ")
    )]
    PoolStageIncomplete {
        blocking: Vec<MatchId>,
        unscheduled: Vec<MatchId>,
    },

    /// Bracket matches already carry played results
    #[error("{bracket_type} bracket already started: {} match(es) have results: {}", blocking.len(), blocking.join(", "))]
    BracketAlreadyStarted {
        bracket_type: BracketType,
        blocking: Vec<MatchId>,
    },

    /// Pool matches already carry results
    #[error("Pool schedule has results: {} match(es) would be overwritten: {}", blocking.len(), blocking.join(", "))]
    PoolScheduleHasResults { blocking: Vec<MatchId> },

    /// No seed document stored for the bracket
    #[error("No {0} seed document; generate the bracket from standings first")]
    SeedDocumentMissing(BracketType),

    #[error("Division not found: {0}")]
    DivisionNotFound(DivisionKey),

    #[error("Match {match_id} not found in {division}")]
    MatchNotFound {
        division: DivisionKey,
        match_id: MatchId,
    },

    /// Submitted result cannot be applied
    #[error("Invalid result: {0}")]
    InvalidResult(String),
}

impl From<BracketError> for GenerationError {
    fn from(err: BracketError) -> Self {
        match err {
            BracketError::PoolStageIncomplete {
                blocking,
                unscheduled,
                ..
            } => GenerationError::PoolStageIncomplete {
                blocking,
                unscheduled,
            },
            other => GenerationError::Bracket(other),
        }
    }
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DivisionNotFound(key) => GenerationError::DivisionNotFound(key),
            other => GenerationError::Store(other),
        }
    }
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Bracket(e) => match e.category() {
                ErrorCategory::Config => ErrorKind::Config,
                ErrorCategory::Consistency => ErrorKind::Consistency,
                ErrorCategory::Precondition => ErrorKind::Precondition,
            },
            GenerationError::Store(_) => ErrorKind::Store,
            GenerationError::InProgress { .. } => ErrorKind::Conflict,
            GenerationError::PoolStageIncomplete { .. }
            | GenerationError::BracketAlreadyStarted { .. }
            | GenerationError::PoolScheduleHasResults { .. }
            | GenerationError::SeedDocumentMissing(_) => ErrorKind::Precondition,
            GenerationError::DivisionNotFound(_) | GenerationError::MatchNotFound { .. } => {
                ErrorKind::NotFound
            }
            GenerationError::InvalidResult(_) => ErrorKind::Config,
        }
    }

    /// Get a client-safe error message
    ///
    /// Store errors are sanitized; consistency errors keep their diagnostics
    /// out of responses (they are logged instead).
    pub fn client_message(&self) -> String {
        match self {
            GenerationError::Store(e) => e.client_message(),
            GenerationError::Bracket(e) if e.category() == ErrorCategory::Consistency => {
                "Internal consistency error during generation".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Result type for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;
