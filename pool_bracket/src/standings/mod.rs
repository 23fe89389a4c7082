//! Pool standings: ranking and the post-completion projection that keeps
//! stored standings current.

pub mod calculator;
pub mod projection;

pub use calculator::{
    StandingsCalculator, Tiebreaker, latest_watermark, needs_recompute, results_fingerprint,
};
pub use projection::{ProjectionOutcome, RetryPolicy, StandingsProjector};
