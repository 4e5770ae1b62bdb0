use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use sqlx::types::Json as SqlxJson;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Assignment;
use crate::schemas::answer_key::AnswerKey;
use crate::schemas::assignment::{
    AnswerKeyMergeRequest, AnswerKeyMergeResponse, AssignmentCreate, AssignmentResponse,
    CategoryUpdate, GradeAllRequest, NavigateQuery, RenamedQuestion,
};
use crate::schemas::submission::{SubmissionCreate, SubmissionResponse};
use crate::services::answer_key::normalize_answer_key;
use crate::services::answer_key_merge::{merge_answer_keys, sort_by_question_path};
use crate::services::review_triage::TriageRow;
use crate::tasks::grading::{self, GradeAllSelection, NewSubmission};
use crate::tasks::jobs::BatchStatus;

#[derive(Debug, Deserialize)]
pub(crate) struct ListAssignmentsQuery {
    #[serde(alias = "classroomId")]
    classroom_id: String,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_assignment).get(list_assignments))
        .route("/:assignment_id", get(get_assignment))
        .route("/:assignment_id/answer-key", get(get_answer_key).put(replace_answer_key))
        .route("/:assignment_id/answer-key/merge", post(merge_answer_key))
        .route(
            "/:assignment_id/answer-key/questions/:question_id/category",
            put(change_question_category),
        )
        .route("/:assignment_id/submissions", post(create_submission).get(list_submissions))
        .route("/:assignment_id/review-queue", get(review_queue))
        .route("/:assignment_id/review-queue/navigate", get(navigate_review_queue))
        .route("/:assignment_id/grade-all", post(grade_all))
}

async fn load_assignment(state: &AppState, assignment_id: &str) -> Result<Assignment, ApiError> {
    state
        .store()
        .find_assignment(assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))
}

async fn store_answer_key(
    state: &AppState,
    mut assignment: Assignment,
    answer_key: AnswerKey,
) -> Result<AnswerKey, ApiError> {
    assignment.answer_key = Some(SqlxJson(answer_key.clone()));
    assignment.updated_at = primitive_now_utc();
    state
        .store()
        .save_assignment(&assignment)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to save answer key"))?;
    Ok(answer_key)
}

async fn create_assignment(
    State(state): State<AppState>,
    Json(payload): Json<AssignmentCreate>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = primitive_now_utc();
    let assignment = Assignment {
        id: Uuid::new_v4().to_string(),
        classroom_id: payload.classroom_id.trim().to_string(),
        title: payload.title.trim().to_string(),
        answer_key: payload.answer_key.as_ref().map(|raw| SqlxJson(normalize_answer_key(raw))),
        created_at: now,
        updated_at: now,
    };
    state
        .store()
        .save_assignment(&assignment)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create assignment"))?;

    tracing::info!(
        assignment_id = %assignment.id,
        classroom_id = %assignment.classroom_id,
        "Assignment created"
    );
    Ok((StatusCode::CREATED, Json(AssignmentResponse::from_db(assignment))))
}

async fn list_assignments(
    State(state): State<AppState>,
    Query(params): Query<ListAssignmentsQuery>,
) -> Result<Json<Vec<AssignmentResponse>>, ApiError> {
    let assignments = state
        .store()
        .list_assignments(&params.classroom_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list assignments"))?;
    Ok(Json(assignments.into_iter().map(AssignmentResponse::from_db).collect()))
}

async fn get_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let assignment = load_assignment(&state, &assignment_id).await?;
    Ok(Json(AssignmentResponse::from_db(assignment)))
}

async fn get_answer_key(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<AnswerKey>, ApiError> {
    let assignment = load_assignment(&state, &assignment_id).await?;
    Ok(Json(assignment.answer_key.map(|key| key.0).unwrap_or_default()))
}

async fn replace_answer_key(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<AnswerKey>, ApiError> {
    let assignment = load_assignment(&state, &assignment_id).await?;
    let answer_key = normalize_answer_key(&payload);
    let stored = store_answer_key(&state, assignment, answer_key).await?;
    Ok(Json(stored))
}

async fn merge_answer_key(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(payload): Json<AnswerKeyMergeRequest>,
) -> Result<Json<AnswerKeyMergeResponse>, ApiError> {
    let assignment = load_assignment(&state, &assignment_id).await?;
    let incoming = normalize_answer_key(&payload.questions);
    let outcome =
        merge_answer_keys(assignment.answer_key.as_ref().map(|key| &key.0), &incoming);

    let merged = if payload.sort_by_id {
        sort_by_question_path(&outcome.answer_key)
    } else {
        outcome.answer_key
    };
    let answer_key = store_answer_key(&state, assignment, merged).await?;

    Ok(Json(AnswerKeyMergeResponse {
        answer_key,
        notice: outcome.notice,
        renamed: outcome
            .renamed
            .into_iter()
            .map(|(from, to)| RenamedQuestion { from, to })
            .collect(),
    }))
}

async fn change_question_category(
    State(state): State<AppState>,
    Path((assignment_id, question_id)): Path<(String, String)>,
    Json(payload): Json<CategoryUpdate>,
) -> Result<Json<AnswerKey>, ApiError> {
    let assignment = load_assignment(&state, &assignment_id).await?;
    let mut answer_key = assignment.answer_key.as_ref().map(|key| key.0.clone()).unwrap_or_default();
    answer_key
        .change_category(&question_id, payload.category)
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    tracing::info!(
        assignment_id = %assignment_id,
        question_id = %question_id,
        category = payload.category.as_str(),
        "Question category changed"
    );
    let stored = store_answer_key(&state, assignment, answer_key).await?;
    Ok(Json(stored))
}

async fn create_submission(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(payload): Json<SubmissionCreate>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let submission = grading::create_submission(
        &state,
        &assignment_id,
        NewSubmission { seat_number: payload.seat_number, student_name: payload.student_name },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(SubmissionResponse::from_db(submission))))
}

async fn list_submissions(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    load_assignment(&state, &assignment_id).await?;
    let submissions = state
        .store()
        .list_submissions(&assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;
    Ok(Json(submissions.into_iter().map(SubmissionResponse::from_db).collect()))
}

async fn review_queue(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<Vec<TriageRow>>, ApiError> {
    Ok(Json(grading::review_queue(&state, &assignment_id).await?))
}

async fn navigate_review_queue(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Query(params): Query<NavigateQuery>,
) -> Result<Json<Option<TriageRow>>, ApiError> {
    let row =
        grading::navigate_queue(&state, &assignment_id, &params.from, params.direction).await?;
    Ok(Json(row))
}

async fn grade_all(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    payload: Option<Json<GradeAllRequest>>,
) -> Result<(StatusCode, Json<BatchStatus>), ApiError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let answer_key = grading::load_answer_key(&state, &assignment_id).await?;
    let submissions = state
        .store()
        .list_submissions(&assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    let selection = grading::select_for_grade_all(submissions);
    if matches!(selection, GradeAllSelection::Empty) {
        return Err(ApiError::BadRequest("No submissions are ready for grading".to_string()));
    }
    if selection.requires_confirmation() && !request.confirm {
        return Err(ApiError::Conflict(
            "Every submission is already graded; confirm to overwrite the results".to_string(),
        ));
    }

    let status = state.jobs().start(
        state.clone(),
        &assignment_id,
        selection.into_submissions(),
        answer_key,
        request.on_image_failure,
    )?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}
