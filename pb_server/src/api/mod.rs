//! HTTP API for the pool-to-bracket engine.
//!
//! Organizers upsert a division, trigger generation runs and record match
//! results; every endpoint is scoped to one division of one tournament.
//!
//! # Modules
//!
//! - [`divisions`]: division setup and read access to matches
//! - [`generation`]: pool schedule and bracket generation triggers
//! - [`matches`]: result submission and pool standings
//! - [`request_id`]: request id propagation
//!
//! # Errors
//!
//! Every failure is answered with `{"error", "kind", "request_id"}`. The
//! status follows the error kind:
//!
//! ```text
//! config        400 Bad Request
//! not_found     404 Not Found
//! conflict      409 Conflict (with Retry-After)
//! precondition  412 Precondition Failed
//! consistency   500 Internal Server Error
//! store         500 Internal Server Error
//! ```

pub mod divisions;
pub mod generation;
pub mod matches;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use pool_bracket::{
    DivisionStore, GenerationConfig, GenerationCoordinator, GenerationError, MatchCompletion,
    db::Database, generation::ErrorKind,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use request_id::RequestId;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<GenerationCoordinator>,
    pub completion: Arc<MatchCompletion>,
    pub store: Arc<dyn DivisionStore>,
    /// Present when backed by PostgreSQL; checked by `/health`
    pub database: Option<Database>,
}

impl AppState {
    /// Build the engine services over one store
    pub fn new(store: Arc<dyn DivisionStore>, config: GenerationConfig) -> Self {
        let completion = MatchCompletion::new(store.clone(), config.retry_policy());
        let coordinator = GenerationCoordinator::new(store.clone(), config);

        Self {
            coordinator: Arc::new(coordinator),
            completion: Arc::new(completion),
            store,
            database: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}

/// Create the complete API router with all endpoints and middleware.
///
/// ```text
/// GET  /health
/// PUT  /api/v1/tournaments/{t}/divisions/{d}
/// GET  /api/v1/tournaments/{t}/divisions/{d}
/// GET  /api/v1/tournaments/{t}/divisions/{d}/matches?stage=pool|bracket
/// POST /api/v1/tournaments/{t}/divisions/{d}/pool-schedule
/// POST /api/v1/tournaments/{t}/divisions/{d}/bracket
/// POST /api/v1/tournaments/{t}/divisions/{d}/bracket/{main|plate}/from-seeds
/// POST /api/v1/tournaments/{t}/divisions/{d}/matches/{id}/complete
/// GET  /api/v1/tournaments/{t}/divisions/{d}/standings/{pool}
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_v1_router())
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(axum::middleware::from_fn(request_id::request_id_middleware)),
        )
        .with_state(state)
}

fn create_v1_router() -> Router<AppState> {
    let division = Router::new()
        .route(
            "/",
            get(divisions::get_division).put(divisions::upsert_division),
        )
        .route("/matches", get(divisions::list_matches))
        .route("/pool-schedule", post(generation::generate_pool_schedule))
        .route("/bracket", post(generation::generate_bracket))
        .route(
            "/bracket/{bracket_type}/from-seeds",
            post(generation::generate_bracket_from_seeds),
        )
        .route("/matches/{match_id}/complete", post(matches::complete_match))
        .route("/standings/{pool}", get(matches::get_standings));

    Router::new().nest("/tournaments/{tournament_id}/divisions/{division_id}", division)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store is reachable, `503 Service Unavailable`
/// otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match &state.database {
        Some(database) => database.health_check().await.is_ok(),
        None => true,
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": state.database.as_ref().map(|_| db_healthy),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

/// Stable label of an error kind, used in bodies, logs and metrics
pub fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Config => "config",
        ErrorKind::Consistency => "consistency",
        ErrorKind::Precondition => "precondition",
        ErrorKind::Conflict => "conflict",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Store => "store",
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Config => StatusCode::BAD_REQUEST,
        ErrorKind::Precondition => StatusCode::PRECONDITION_FAILED,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Consistency | ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    pub request_id: String,
}

/// Error answered by every handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Map an engine error to its response, logging what the client does not see
    pub fn from_generation(err: GenerationError, request_id: &RequestId) -> Self {
        let kind = err.kind();
        if matches!(kind, ErrorKind::Consistency | ErrorKind::Store) {
            tracing::error!(request_id = %request_id.as_str(), error = %err, "Request failed");
        }

        let retry_after_secs = match &err {
            GenerationError::InProgress {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        };

        Self {
            status: status_for(kind),
            body: ErrorResponse {
                error: err.client_message(),
                kind: kind_label(kind),
                request_id: request_id.as_str().to_string(),
            },
            retry_after_secs,
        }
    }

    /// Reject malformed input that never reached the engine
    pub fn bad_request(message: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: message.into(),
                kind: kind_label(ErrorKind::Config),
                request_id: request_id.as_str().to_string(),
            },
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorResponse {
                error: message.into(),
                kind: kind_label(ErrorKind::NotFound),
                request_id: request_id.as_str().to_string(),
            },
            retry_after_secs: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after_secs
            && let Ok(value) = HeaderValue::from_str(&secs.max(1).to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_bracket::division::DivisionKey;
    use pool_bracket::generation::LockFamily;

    fn request_id() -> RequestId {
        RequestId("req-1".to_string())
    }

    #[test]
    fn test_conflict_carries_retry_after() {
        let err = GenerationError::InProgress {
            division: DivisionKey::new("t", "d"),
            family: LockFamily::Bracket,
            retry_after_secs: 0,
        };

        let api = ApiError::from_generation(err, &request_id());
        assert_eq!(api.status(), StatusCode::CONFLICT);

        let response = api.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Config), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::Precondition),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(ErrorKind::Store),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_division() {
        let err = GenerationError::DivisionNotFound(DivisionKey::new("t", "d"));
        let api = ApiError::from_generation(err, &request_id());
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
        assert_eq!(api.body.kind, "not_found");
        assert_eq!(api.body.request_id, "req-1");
    }
}
