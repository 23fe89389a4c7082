//! Generation triggers.
//!
//! Each endpoint runs one locked generation operation and answers with its
//! report. A run that finds the lock held answers `409` with `Retry-After`.
//!
//! ```bash
//! curl -X POST http://localhost:6970/api/v1/tournaments/spring/divisions/mixed/pool-schedule
//! curl -X POST http://localhost:6970/api/v1/tournaments/spring/divisions/mixed/bracket
//! curl -X POST http://localhost:6970/api/v1/tournaments/spring/divisions/mixed/bracket/plate/from-seeds
//! ```

use axum::{
    Json,
    extract::{Path, State},
};
use pool_bracket::{
    GenerationError, GenerationReport,
    division::{BracketType, DivisionKey},
    generation::{GenerationOperation, GenerationResult},
};
use std::time::Instant;

use super::{ApiError, AppState, kind_label, request_id::RequestId};
use crate::{logging, metrics};

/// Generate (or regenerate) the round-robin schedule of every pool.
///
/// # Errors
///
/// - `400 Bad Request`: Invalid pool assignment
/// - `404 Not Found`: Unknown division
/// - `409 Conflict`: Pool schedule generation already running
/// - `412 Precondition Failed`: Pool matches already carry results
pub async fn generate_pool_schedule(
    State(state): State<AppState>,
    Path((tournament_id, division_id)): Path<(String, String)>,
    request_id: RequestId,
) -> Result<Json<GenerationReport>, ApiError> {
    let division = DivisionKey::new(tournament_id, division_id);
    let started = Instant::now();
    let outcome = state.coordinator.generate_pool_schedule(&division).await;
    finish(
        GenerationOperation::PoolSchedule,
        &division,
        started,
        outcome,
        &request_id,
    )
}

/// Seed and generate the main (and plate) bracket from final pool standings.
///
/// # Errors
///
/// - `400 Bad Request`: Unsupported advancement or too few qualifiers
/// - `404 Not Found`: Unknown division
/// - `409 Conflict`: Bracket generation already running
/// - `412 Precondition Failed`: Pool stage unfinished or bracket already started
pub async fn generate_bracket(
    State(state): State<AppState>,
    Path((tournament_id, division_id)): Path<(String, String)>,
    request_id: RequestId,
) -> Result<Json<GenerationReport>, ApiError> {
    let division = DivisionKey::new(tournament_id, division_id);
    let started = Instant::now();
    let outcome = state
        .coordinator
        .generate_bracket_from_standings(&division)
        .await;
    finish(
        GenerationOperation::BracketFromStandings,
        &division,
        started,
        outcome,
        &request_id,
    )
}

/// Regenerate one bracket from its stored seed document.
///
/// # Errors
///
/// - `400 Bad Request`: Unknown bracket type
/// - `412 Precondition Failed`: No seed document, or bracket already started
pub async fn generate_bracket_from_seeds(
    State(state): State<AppState>,
    Path((tournament_id, division_id, bracket_type)): Path<(String, String, String)>,
    request_id: RequestId,
) -> Result<Json<GenerationReport>, ApiError> {
    let bracket_type: BracketType = bracket_type
        .parse()
        .map_err(|e: String| ApiError::bad_request(e, &request_id))?;

    let division = DivisionKey::new(tournament_id, division_id);
    let started = Instant::now();
    let outcome = state
        .coordinator
        .generate_bracket_from_seeds(&division, bracket_type)
        .await;
    finish(
        GenerationOperation::BracketFromSeeds,
        &division,
        started,
        outcome,
        &request_id,
    )
}

/// Record metrics and logs for a finished run and shape its response
fn finish(
    operation: GenerationOperation,
    division: &DivisionKey,
    started: Instant,
    outcome: GenerationResult<GenerationReport>,
    request_id: &RequestId,
) -> Result<Json<GenerationReport>, ApiError> {
    let elapsed = started.elapsed();
    let label = match &outcome {
        Ok(_) => "ok",
        Err(e) => kind_label(e.kind()),
    };

    if let Err(GenerationError::InProgress { family, .. }) = &outcome {
        metrics::record_lock_conflict(family.as_str());
    }
    metrics::record_generation(operation.as_str(), label, elapsed);
    logging::log_generation_event(operation.as_str(), &division.to_string(), label, elapsed);

    match outcome {
        Ok(report) => {
            tracing::info!(
                request_id = %request_id.as_str(),
                run_id = %report.run_id,
                matches_written = report.matches_written,
                matches_removed = report.matches_removed,
                "Generation report"
            );
            Ok(Json(report))
        }
        Err(e) => Err(ApiError::from_generation(e, request_id)),
    }
}
