use std::time::Instant;

use sqlx::types::Json;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;
use crate::schemas::answer_key::AnswerKey;
use crate::services::ai_grading::GradingOptions;
use crate::services::image_ref::ImageRef;
use crate::services::review_triage::apply_triage;

use super::{acquire_image, GradingError};

pub(crate) async fn load_answer_key(
    state: &AppState,
    assignment_id: &str,
) -> Result<AnswerKey, GradingError> {
    let assignment = state
        .store()
        .find_assignment(assignment_id)
        .await?
        .ok_or_else(|| GradingError::NotFound(format!("assignment {assignment_id}")))?;

    match assignment.answer_key {
        Some(Json(key)) if !key.questions().is_empty() => Ok(key),
        _ => Err(GradingError::NotGradable(format!(
            "assignment {assignment_id} has no answer key"
        ))),
    }
}

/// Grades one submission from scratch and stores the result.
pub(crate) async fn grade_one(
    state: &AppState,
    submission_id: &str,
) -> Result<Submission, GradingError> {
    let submission = state
        .store()
        .find_submission(submission_id)
        .await?
        .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;
    let answer_key = load_answer_key(state, &submission.assignment_id).await?;

    let (image, source) = acquire_image(state, &submission).await?;
    tracing::debug!(submission_id, source = source.as_str(), "Image acquired");

    grade_with_image(state, submission, &answer_key, &image).await
}

/// Full grade with an already resolved image; replaces any previous result.
pub(crate) async fn grade_with_image(
    state: &AppState,
    mut submission: Submission,
    answer_key: &AnswerKey,
    image: &ImageRef,
) -> Result<Submission, GradingError> {
    let timer = Instant::now();
    let grading = state.settings().grading();
    let options = GradingOptions {
        strict: grading.strict,
        domain: grading.domain.clone(),
        regrade: None,
    };

    let outcome = state
        .grader()
        .grade_submission(image, submission.grading_result(), answer_key, &options)
        .await;

    let mut result = match outcome {
        Ok(result) => result,
        Err(source) => {
            metrics::counter!("grading_jobs_total", "status" => "failed").increment(1);
            tracing::error!(
                submission_id = %submission.id,
                error = %source,
                "AI grading failed"
            );
            return Err(GradingError::GradingService { submission_id: submission.id, source });
        }
    };

    result.settle();
    let verdict = apply_triage(&mut result, false, grading.review_confidence_threshold);

    let now = primitive_now_utc();
    submission.status = SubmissionStatus::Graded;
    submission.score = Some(result.total_score);
    submission.graded_at = Some(now);
    submission.teacher_feedback = None;
    if submission.stored_image().is_none() {
        submission.image_base64 = Some(image.to_base64().to_string());
    }
    submission.result = Some(Json(result));
    submission.updated_at = now;

    state.store().save_submission(&submission).await?;
    // A stored full grade starts a fresh review session.
    state.ledger().reset(&submission.id);

    metrics::counter!("grading_jobs_total", "status" => "success").increment(1);
    metrics::histogram!("grading_duration_seconds").record(timer.elapsed().as_secs_f64());
    tracing::info!(
        submission_id = %submission.id,
        assignment_id = %submission.assignment_id,
        score = submission.score,
        needs_review = verdict.needs_review,
        "Submission graded"
    );

    Ok(submission)
}
