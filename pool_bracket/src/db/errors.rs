//! Store error types.

use std::time::Duration;
use thiserror::Error;

use crate::division::{DivisionKey, MatchId};

/// Errors raised by a [`DivisionStore`](super::DivisionStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Document (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation exceeded its deadline
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Division record does not exist
    #[error("Division not found: {0}")]
    DivisionNotFound(DivisionKey),

    /// Patch target does not exist
    #[error("Match not found: {0}")]
    MissingMatch(MatchId),

    /// Stored row could not be interpreted
    #[error("Corrupt record {0}: {1}")]
    Corrupt(String, String),

    /// Backend refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Get a client-safe error message that doesn't leak storage internals
    pub fn client_message(&self) -> String {
        match self {
            StoreError::DivisionNotFound(_) => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
