//! Elimination bracket pipeline: qualifier selection, seeding and match tree
//! generation.

pub mod errors;
pub mod generator;
pub mod position_index;
pub mod qualifier;
pub mod seeder;

pub use errors::{BracketError, BracketResult, ErrorCategory};
pub use generator::{BracketMatchGenerator, apply_bye_advancement};
pub use position_index::{BracketPosition, PositionIndex, TempId};
pub use qualifier::{
    AdvancementRule, PoolQualification, QualificationOutcome, Qualifier, QualifierSelector,
    Remainder, ensure_pool_stage_complete,
};
pub use seeder::{BracketSeeder, validate_seed_document};
