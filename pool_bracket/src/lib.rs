//! # Pool Bracket
//!
//! A pool-to-bracket tournament scheduling engine.
//!
//! Participants are split into round-robin pools; finished pools are ranked,
//! qualifiers are seeded into a single-elimination bracket (plus an optional
//! plate bracket for non-qualifiers), and the full linked match tree is written
//! to a shared store. Every generation is idempotent and guarded by a
//! per-division lock that survives crashed callers through a staleness timeout.
//!
//! ## Pipeline
//!
//! - **PoolScheduleBuilder**: round-robin matches per pool
//! - **StandingsCalculator**: ranked standings with a tiebreaker chain
//! - **QualifierSelector**: qualifiers, plate-eligible and eliminated
//! - **BracketSeeder**: BYEs and round-1 pairings in a seed document
//! - **BracketMatchGenerator**: linked match tree with BYE auto-advance
//! - **GenerationCoordinator**: locked, crash-safe generation runs
//!
//! ## Core Modules
//!
//! - [`division`]: data model and canonical ids
//! - [`schedule`]: pool schedule generation
//! - [`standings`]: standings and their post-completion projection
//! - [`bracket`]: qualification, seeding and match tree generation
//! - [`generation`]: locks, coordinator and match completion
//! - [`db`]: store contract with PostgreSQL and in-memory backends
//!
//! ## Example
//!
//! ```
//! use pool_bracket::division::{DefaultIdStrategy, DivisionKey, Participant, Pool, ScoringConfig};
//! use pool_bracket::schedule::PoolScheduleBuilder;
//!
//! let division = DivisionKey::new("spring-open", "mixed");
//! let pool = Pool::new(
//!     "Pool A",
//!     vec![
//!         Participant::new("p1", "Aces"),
//!         Participant::new("p2", "Blockers"),
//!         Participant::new("p3", "Diggers"),
//!     ],
//! );
//!
//! let matches = PoolScheduleBuilder::new(&DefaultIdStrategy, ScoringConfig::default())
//!     .build(&division, &[pool])
//!     .unwrap();
//! assert_eq!(matches.len(), 3);
//! ```

/// Elimination bracket pipeline.
pub mod bracket;

/// Persistence layer.
pub mod db;

/// Data model and canonical ids.
pub mod division;

/// Generation operations, locks and match completion.
pub mod generation;

/// Pool schedule generation.
pub mod schedule;

/// Standings calculation and projection.
pub mod standings;

pub use bracket::{BracketError, BracketResult};
pub use db::{DivisionStore, MemoryDivisionStore, PgDivisionStore, StoreError};
pub use generation::{
    GenerationConfig, GenerationCoordinator, GenerationError, GenerationReport, MatchCompletion,
    ResultSubmission,
};
