use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::submission::{ImageCapture, RegradeBody, RegradeResponse, SubmissionResponse};
use crate::tasks::grading::{self, DetailEdit};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:submission_id", get(open_submission))
        .route("/:submission_id/close", post(close_submission))
        .route("/:submission_id/image", post(capture_image))
        .route("/:submission_id/sync", post(sync_image))
        .route("/:submission_id/grade", post(grade_submission))
        .route("/:submission_id/regrade", post(regrade_submission))
        .route("/:submission_id/flags/:question_id", post(flag_question).delete(unflag_question))
        .route("/:submission_id/details/:question_id", patch(edit_detail))
}

async fn open_submission(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = grading::open_submission(&state, &submission_id).await?;
    Ok(Json(SubmissionResponse::from_db(submission)))
}

async fn close_submission(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> StatusCode {
    grading::close_submission(&state, &submission_id);
    StatusCode::NO_CONTENT
}

async fn capture_image(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
    Json(payload): Json<ImageCapture>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let submission = grading::capture_image(&state, &submission_id, &payload.image_base64).await?;
    Ok(Json(SubmissionResponse::from_db(submission)))
}

async fn sync_image(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = grading::sync_image(&state, &submission_id).await?;
    Ok(Json(SubmissionResponse::from_db(submission)))
}

async fn grade_submission(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = grading::grade_one(&state, &submission_id).await?;
    Ok(Json(SubmissionResponse::from_db(submission)))
}

async fn regrade_submission(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
    payload: Option<Json<RegradeBody>>,
) -> Result<Json<RegradeResponse>, ApiError> {
    let body = payload.map(|Json(body)| body).unwrap_or_default();
    let outcome = grading::regrade_questions(&state, &submission_id, body.question_ids).await?;
    Ok(Json(RegradeResponse {
        submission: SubmissionResponse::from_db(outcome.submission),
        targeted: outcome.targeted,
        missing_targets: outcome.missing_targets,
    }))
}

async fn flag_question(
    State(state): State<AppState>,
    Path((submission_id, question_id)): Path<(String, String)>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = grading::flag_question(&state, &submission_id, &question_id).await?;
    Ok(Json(SubmissionResponse::from_db(submission)))
}

async fn unflag_question(
    State(state): State<AppState>,
    Path((submission_id, question_id)): Path<(String, String)>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = grading::unflag_question(&state, &submission_id, &question_id).await?;
    Ok(Json(SubmissionResponse::from_db(submission)))
}

async fn edit_detail(
    State(state): State<AppState>,
    Path((submission_id, question_id)): Path<(String, String)>,
    Json(payload): Json<DetailEdit>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = grading::edit_detail(&state, &submission_id, &question_id, payload).await?;
    Ok(Json(SubmissionResponse::from_db(submission)))
}
