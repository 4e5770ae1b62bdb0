use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::tasks::jobs::BatchStatus;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:job_id", get(get_batch))
        .route("/:job_id/stop", post(stop_batch))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<BatchStatus>, ApiError> {
    state
        .jobs()
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Batch job not found".to_string()))
}

async fn stop_batch(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<(StatusCode, Json<BatchStatus>), ApiError> {
    state
        .jobs()
        .stop(&job_id)
        .map(|status| (StatusCode::ACCEPTED, Json(status)))
        .ok_or_else(|| ApiError::NotFound("Batch job not found".to_string()))
}
