use sqlx::types::Json;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::services::ai_grading::{GradingOptions, RegradeRequest};
use crate::services::detail_merge::merge_regrade;

use super::{acquire_image, load_answer_key, GradingError};

#[derive(Debug, Clone)]
pub(crate) struct RegradeOutcome {
    pub(crate) submission: Submission,
    pub(crate) targeted: Vec<String>,
    pub(crate) missing_targets: Vec<String>,
}

/// Re-evaluates only the targeted questions and patches them into the stored result.
///
/// Without explicit ids the targets are the teacher's flags plus every
/// question the answer key marks for re-analysis.
pub(crate) async fn regrade_questions(
    state: &AppState,
    submission_id: &str,
    question_ids: Option<Vec<String>>,
) -> Result<RegradeOutcome, GradingError> {
    let mut submission = state
        .store()
        .find_submission(submission_id)
        .await?
        .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;
    let answer_key = load_answer_key(state, &submission.assignment_id).await?;
    let existing = submission.grading_result().cloned().ok_or_else(|| {
        GradingError::NotGradable(format!("submission {submission_id} has not been graded yet"))
    })?;

    let targeted = match question_ids {
        Some(ids) if !ids.is_empty() => dedup(ids),
        _ => {
            let mut ids = state.ledger().flagged(submission_id);
            ids.extend(answer_key.reanalysis_question_ids());
            dedup(ids)
        }
    };
    if targeted.is_empty() {
        return Err(GradingError::NotGradable(format!(
            "submission {submission_id} has no questions to regrade"
        )));
    }

    let force_unrecognizable: Vec<String> = targeted
        .iter()
        .filter(|question_id| state.ledger().attempts(submission_id, question_id) > 0)
        .cloned()
        .collect();
    let previous_details = existing
        .details
        .iter()
        .filter(|detail| targeted.contains(&detail.question_id))
        .cloned()
        .collect();

    let (image, _) = acquire_image(state, &submission).await?;
    let grading = state.settings().grading();
    let options = GradingOptions {
        strict: grading.strict,
        domain: grading.domain.clone(),
        regrade: Some(RegradeRequest {
            question_ids: targeted.clone(),
            previous_details,
            force_unrecognizable_question_ids: force_unrecognizable.clone(),
        }),
    };

    tracing::info!(
        submission_id,
        targeted = targeted.len(),
        forced = force_unrecognizable.len(),
        "Regrading questions"
    );
    let regraded = state
        .grader()
        .grade_submission(&image, Some(&existing), &answer_key, &options)
        .await
        .map_err(|source| {
            tracing::error!(submission_id, error = %source, "Regrade failed");
            GradingError::GradingService { submission_id: submission_id.to_string(), source }
        })?;

    state.ledger().record_attempts(submission_id, &targeted);
    let merged = merge_regrade(&existing.details, &regraded.details, &targeted);
    if !merged.missing_targets.is_empty() {
        tracing::warn!(
            submission_id,
            missing = ?merged.missing_targets,
            "Regrade returned no detail for some targeted questions"
        );
    }

    let mut result = existing;
    result.details = merged.details;
    result.total_score = merged.total_score;
    result.needs_review = false;
    result.review_reasons.clear();

    let now = primitive_now_utc();
    submission.score = Some(result.total_score);
    submission.graded_at = Some(now);
    submission.result = Some(Json(result));
    submission.updated_at = now;
    state.store().save_submission(&submission).await?;
    state.auto_clear().cancel(submission_id);

    metrics::counter!("regrade_questions_total").increment(targeted.len() as u64);

    Ok(RegradeOutcome { submission, targeted, missing_targets: merged.missing_targets })
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim().to_string();
        if !id.is_empty() && !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
