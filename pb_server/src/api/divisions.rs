//! Division setup and read access.
//!
//! # Examples
//!
//! Create or update a division:
//! ```bash
//! curl -X PUT http://localhost:6970/api/v1/tournaments/spring/divisions/mixed \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Mixed Open", "pools": [{"name": "Pool A", "participants": [{"id": "p1", "name": "Aces"}]}]}'
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
};
use pool_bracket::{
    GenerationError,
    division::{DivisionConfig, DivisionKey, DivisionRecord, Match, Participant, Pool, Stage},
    schedule::validate_assignment,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, request_id::RequestId};

#[derive(Debug, Deserialize)]
pub struct UpsertDivisionRequest {
    pub name: String,
    #[serde(default)]
    pub config: DivisionConfig,
    pub pools: Vec<PoolPayload>,
}

#[derive(Debug, Deserialize)]
pub struct PoolPayload {
    /// Display name; the pool key is derived from it ("Pool A" -> "A")
    pub name: String,
    pub participants: Vec<ParticipantPayload>,
}

#[derive(Debug, Deserialize)]
pub struct ParticipantPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

impl From<PoolPayload> for Pool {
    fn from(payload: PoolPayload) -> Self {
        let participants = payload
            .participants
            .into_iter()
            .map(|p| Participant::new(p.id, p.name).with_members(p.member_ids))
            .collect();
        Pool::new(payload.name, participants)
    }
}

#[derive(Debug, Serialize)]
pub struct DivisionResponse {
    pub division: DivisionRecord,
    pub pools: Vec<Pool>,
}

#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    pub stage: Option<Stage>,
}

/// Create or replace a division's name, configuration and pool assignment.
///
/// Generation locks of an existing division are kept. Matches are not
/// touched; regenerate the pool schedule to apply a new assignment.
///
/// # Errors
///
/// - `400 Bad Request`: Invalid pool assignment
/// - `500 Internal Server Error`: Store failure
pub async fn upsert_division(
    State(state): State<AppState>,
    Path((tournament_id, division_id)): Path<(String, String)>,
    request_id: RequestId,
    Json(request): Json<UpsertDivisionRequest>,
) -> Result<Json<DivisionResponse>, ApiError> {
    let key = DivisionKey::new(tournament_id, division_id);
    let pools: Vec<Pool> = request.pools.into_iter().map(Pool::from).collect();

    validate_assignment(&pools)
        .map_err(|e| ApiError::from_generation(GenerationError::from(e), &request_id))?;

    let record = DivisionRecord::new(key.clone(), request.name, request.config);
    state
        .store
        .save_division(&record)
        .await
        .map_err(|e| ApiError::from_generation(e.into(), &request_id))?;
    state
        .store
        .save_pools(&key, &pools)
        .await
        .map_err(|e| ApiError::from_generation(e.into(), &request_id))?;

    tracing::info!(
        request_id = %request_id.as_str(),
        division = %key,
        pools = pools.len(),
        "Division saved"
    );

    let division = load_record(&state, &key, &request_id).await?;
    Ok(Json(DivisionResponse { division, pools }))
}

/// Division record (including lock states) and its pools.
///
/// # Errors
///
/// - `404 Not Found`: Unknown division
pub async fn get_division(
    State(state): State<AppState>,
    Path((tournament_id, division_id)): Path<(String, String)>,
    request_id: RequestId,
) -> Result<Json<DivisionResponse>, ApiError> {
    let key = DivisionKey::new(tournament_id, division_id);
    let division = load_record(&state, &key, &request_id).await?;
    let pools = state
        .store
        .load_pools(&key)
        .await
        .map_err(|e| ApiError::from_generation(e.into(), &request_id))?;

    Ok(Json(DivisionResponse { division, pools }))
}

/// Matches of a division in schedule order, optionally filtered by stage.
pub async fn list_matches(
    State(state): State<AppState>,
    Path((tournament_id, division_id)): Path<(String, String)>,
    Query(query): Query<MatchQuery>,
    request_id: RequestId,
) -> Result<Json<Vec<Match>>, ApiError> {
    let key = DivisionKey::new(tournament_id, division_id);
    load_record(&state, &key, &request_id).await?;

    let matches = state
        .store
        .load_matches(&key, query.stage)
        .await
        .map_err(|e| ApiError::from_generation(e.into(), &request_id))?;

    Ok(Json(matches))
}

async fn load_record(
    state: &AppState,
    key: &DivisionKey,
    request_id: &RequestId,
) -> Result<DivisionRecord, ApiError> {
    state
        .store
        .load_division(key)
        .await
        .map_err(|e| ApiError::from_generation(e.into(), request_id))?
        .ok_or_else(|| {
            ApiError::from_generation(GenerationError::DivisionNotFound(key.clone()), request_id)
        })
}
