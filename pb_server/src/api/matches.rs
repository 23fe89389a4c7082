//! Result submission and pool standings.
//!
//! ```bash
//! curl -X POST http://localhost:6970/api/v1/tournaments/spring/divisions/mixed/matches/spring_mixed_pool_A_r1m1/complete \
//!   -H "Content-Type: application/json" \
//!   -d '{"winner": "A", "games": [{"a": 21, "b": 17}]}'
//! ```

use axum::{
    Json,
    extract::{Path, State},
};
use pool_bracket::{
    ResultSubmission,
    division::{DivisionKey, MatchStatus, PoolStandings, Stage, normalize_pool_key},
    generation::CompletionReport,
    standings::StandingsCalculator,
};

use super::{ApiError, AppState, request_id::RequestId};
use crate::metrics;

/// Record a match result and advance the winner (and a semifinal loser).
///
/// The response carries the standings refresh outcome for pool matches; a
/// failed refresh does not fail the request.
///
/// # Errors
///
/// - `400 Bad Request`: Match not ready, or inconsistent result
/// - `404 Not Found`: Unknown match
pub async fn complete_match(
    State(state): State<AppState>,
    Path((tournament_id, division_id, match_id)): Path<(String, String, String)>,
    request_id: RequestId,
    Json(submission): Json<ResultSubmission>,
) -> Result<Json<CompletionReport>, ApiError> {
    let division = DivisionKey::new(tournament_id, division_id);

    let report = state
        .completion
        .complete_match(&division, &match_id, submission)
        .await
        .map_err(|e| ApiError::from_generation(e, &request_id))?;

    metrics::record_completion(status_label(report.status));
    if let Some(outcome) = &report.standings
        && outcome.is_failed()
    {
        metrics::record_projection_failure();
        tracing::warn!(
            request_id = %request_id.as_str(),
            division = %division,
            match_id = %match_id,
            "Standings refresh failed after completion"
        );
    }

    Ok(Json(report))
}

/// Current standings of one pool.
///
/// Served from the stored projection; computed on the fly when the pool has
/// not been projected yet.
///
/// # Errors
///
/// - `404 Not Found`: Unknown division or pool
pub async fn get_standings(
    State(state): State<AppState>,
    Path((tournament_id, division_id, pool)): Path<(String, String, String)>,
    request_id: RequestId,
) -> Result<Json<PoolStandings>, ApiError> {
    let division = DivisionKey::new(tournament_id, division_id);
    let pool_key = normalize_pool_key(&pool);
    let store_err = |e: pool_bracket::StoreError| ApiError::from_generation(e.into(), &request_id);

    if let Some(stored) = state
        .store
        .load_standings(&division, &pool_key)
        .await
        .map_err(store_err)?
    {
        return Ok(Json(stored));
    }

    let record = state
        .store
        .load_division(&division)
        .await
        .map_err(store_err)?
        .ok_or_else(|| ApiError::not_found(format!("Division {division} not found"), &request_id))?;

    let pools = state.store.load_pools(&division).await.map_err(store_err)?;
    let pool = pools
        .iter()
        .find(|p| p.key == pool_key)
        .ok_or_else(|| {
            ApiError::not_found(
                format!("Pool {pool_key} not found in {division}"),
                &request_id,
            )
        })?;

    let matches = state
        .store
        .load_matches(&division, Some(Stage::Pool))
        .await
        .map_err(store_err)?;

    let standings = StandingsCalculator::new(record.config.tiebreakers).compute(pool, &matches);
    Ok(Json(standings))
}

fn status_label(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Scheduled => "scheduled",
        MatchStatus::InProgress => "in_progress",
        MatchStatus::Completed => "completed",
        MatchStatus::Forfeit => "forfeit",
    }
}
