//! Locked, idempotent generation operations and match completion.

pub mod completion;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod lock;

pub use completion::{CompletionReport, MatchCompletion, ResultSubmission};
pub use config::GenerationConfig;
pub use coordinator::{GenerationCoordinator, GenerationOperation, GenerationReport};
pub use errors::{ErrorKind, GenerationError, GenerationResult};
pub use lock::{
    Clock, GenerationLock, LockConflict, LockFamily, LockStatus, ManualClock, SystemClock,
};
