use serde::Deserialize;
use sqlx::types::Json;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::schemas::grading::{sum_scores, GradingResult};
use crate::services::review_triage::{
    apply_triage, min_confidence, navigate, order_for_grid, Direction, TriageRow,
    REASON_INCONSISTENT,
};

use super::GradingError;

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct DetailEdit {
    pub(crate) score: Option<f64>,
    pub(crate) comment: Option<String>,
}

async fn load_submission(state: &AppState, submission_id: &str) -> Result<Submission, GradingError> {
    state
        .store()
        .find_submission(submission_id)
        .await?
        .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))
}

fn graded_result(submission: &Submission) -> Result<GradingResult, GradingError> {
    submission.grading_result().cloned().ok_or_else(|| {
        GradingError::NotGradable(format!("submission {} has not been graded yet", submission.id))
    })
}

async fn store_result(
    state: &AppState,
    mut submission: Submission,
    result: GradingResult,
) -> Result<Submission, GradingError> {
    submission.score = Some(result.total_score);
    submission.result = Some(Json(result));
    submission.updated_at = primitive_now_utc();
    state.store().save_submission(&submission).await?;
    Ok(submission)
}

/// Loads a submission for display and starts its auto-clear timer when it needs review.
pub(crate) async fn open_submission(
    state: &AppState,
    submission_id: &str,
) -> Result<Submission, GradingError> {
    let submission = load_submission(state, submission_id).await?;

    if submission.needs_review() {
        let dwell = state.settings().grading().review_auto_clear;
        let task_state = state.clone();
        let id = submission.id.clone();
        state.auto_clear().schedule(submission_id, dwell, move || async move {
            if let Err(err) = clear_review_if_pending(&task_state, &id).await {
                tracing::warn!(submission_id = %id, error = %err, "Review auto-clear failed");
            }
        });
    } else {
        state.auto_clear().cancel(submission_id);
    }

    Ok(submission)
}

pub(crate) fn close_submission(state: &AppState, submission_id: &str) -> bool {
    state.auto_clear().cancel(submission_id)
}

/// Treats the submission as implicitly reviewed. Returns `false` when nothing was pending.
pub(crate) async fn clear_review_if_pending(
    state: &AppState,
    submission_id: &str,
) -> Result<bool, GradingError> {
    let submission = load_submission(state, submission_id).await?;
    let Some(mut result) = submission.grading_result().cloned() else {
        return Ok(false);
    };
    if !result.needs_review {
        return Ok(false);
    }

    result.needs_review = false;
    result.review_reasons.clear();
    store_result(state, submission, result).await?;
    tracing::info!(submission_id, "Review flag cleared after dwell time");
    Ok(true)
}

/// Records a teacher's doubt about how a question's answer was read.
pub(crate) async fn flag_question(
    state: &AppState,
    submission_id: &str,
    question_id: &str,
) -> Result<Submission, GradingError> {
    let submission = load_submission(state, submission_id).await?;
    let mut result = graded_result(&submission)?;
    if result.detail_mut(question_id).is_none() {
        return Err(GradingError::NotFound(format!("question {question_id}")));
    }

    state.auto_clear().cancel(submission_id);
    state.ledger().flag(submission_id, question_id);
    result.needs_review = true;
    if !result.review_reasons.iter().any(|reason| reason == REASON_INCONSISTENT) {
        result.review_reasons.push(REASON_INCONSISTENT.to_string());
    }

    tracing::info!(submission_id, question_id, "Question flagged for review");
    store_result(state, submission, result).await
}

/// Withdraws a flag. A question that was already regraded is marked unreadable.
pub(crate) async fn unflag_question(
    state: &AppState,
    submission_id: &str,
    question_id: &str,
) -> Result<Submission, GradingError> {
    let submission = load_submission(state, submission_id).await?;
    let mut result = graded_result(&submission)?;

    state.auto_clear().cancel(submission_id);
    let outcome = state.ledger().unflag(submission_id, question_id);
    let flags_left = state.ledger().has_flags(submission_id);

    if outcome.force_unreadable {
        if let Some(detail) = result.detail_mut(question_id) {
            detail.mark_unreadable();
        }
        let threshold = state.settings().grading().review_confidence_threshold;
        apply_triage(&mut result, flags_left, threshold);
        tracing::info!(submission_id, question_id, "Question marked unreadable after regrade");
    } else if !flags_left {
        result.review_reasons.retain(|reason| reason != REASON_INCONSISTENT);
        result.needs_review = !result.review_reasons.is_empty();
    }

    store_result(state, submission, result).await
}

/// Manual score or comment change on one detail.
pub(crate) async fn edit_detail(
    state: &AppState,
    submission_id: &str,
    question_id: &str,
    edit: DetailEdit,
) -> Result<Submission, GradingError> {
    let submission = load_submission(state, submission_id).await?;
    let mut result = graded_result(&submission)?;

    state.auto_clear().cancel(submission_id);
    let detail = result
        .detail_mut(question_id)
        .ok_or_else(|| GradingError::NotFound(format!("question {question_id}")))?;
    if let Some(score) = edit.score {
        detail.score = if score.is_finite() { score } else { 0.0 };
    }
    if let Some(comment) = edit.comment {
        detail.reason = comment;
    }
    detail.derive_correctness();
    result.total_score = sum_scores(&result.details);

    store_result(state, submission, result).await
}

/// The assignment's submissions in review-grid order.
pub(crate) async fn review_queue(
    state: &AppState,
    assignment_id: &str,
) -> Result<Vec<TriageRow>, GradingError> {
    if state.store().find_assignment(assignment_id).await?.is_none() {
        return Err(GradingError::NotFound(format!("assignment {assignment_id}")));
    }

    let mut rows: Vec<TriageRow> = state
        .store()
        .list_submissions(assignment_id)
        .await?
        .into_iter()
        .map(triage_row)
        .collect();
    order_for_grid(&mut rows);
    Ok(rows)
}

/// Leaving `from` stops its auto-clear timer; the target is opened separately.
pub(crate) async fn navigate_queue(
    state: &AppState,
    assignment_id: &str,
    from: &str,
    direction: Direction,
) -> Result<Option<TriageRow>, GradingError> {
    state.auto_clear().cancel(from);
    let rows = review_queue(state, assignment_id).await?;
    Ok(navigate(&rows, from, direction).cloned())
}

fn triage_row(submission: Submission) -> TriageRow {
    let (needs_review, review_reasons, confidence) = match submission.grading_result() {
        Some(result) => (
            result.needs_review,
            result.review_reasons.clone(),
            min_confidence(&result.details, &result.page_confidences),
        ),
        None => (false, Vec::new(), None),
    };

    TriageRow {
        submission_id: submission.id,
        seat_number: submission.seat_number,
        student_name: submission.student_name,
        needs_review,
        review_reasons,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SubmissionStatus;
    use crate::schemas::grading::UNREADABLE_ANSWER;
    use crate::services::review_triage::{REASON_LOW_CONFIDENCE, REASON_UNREADABLE};
    use crate::tasks::grading::regrade_questions;
    use crate::test_support::{self, detail, result_with};
    use serde_json::json;
    use std::time::Duration;

    async fn seeded() -> test_support::MemoryContext {
        let ctx = test_support::memory_context().await;
        test_support::seed_assignment(
            &ctx.store,
            "a1",
            json!([
                {"id": "1", "type": "choice", "max_score": 5, "answer": "A"},
                {"id": "2", "type": "choice", "max_score": 5, "answer": "B"}
            ]),
        )
        .await;
        ctx
    }

    fn flagged_result(confidence: f64) -> GradingResult {
        let mut result =
            result_with(vec![detail("1", 2.0, 5.0, Some(confidence)), detail("2", 5.0, 5.0, Some(99.0))]);
        apply_triage(&mut result, false, 80.0);
        result
    }

    #[tokio::test(start_paused = true)]
    async fn open_submission_clears_review_after_dwell() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(50.0)).await;

        let opened = open_submission(&ctx.state, "s1").await.expect("open");
        assert!(opened.needs_review());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(ctx.store.submission("s1").needs_review());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let stored = ctx.store.submission("s1");
        assert!(!stored.needs_review());
        assert!(stored.grading_result().expect("result").review_reasons.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_keeps_the_review_flag() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(50.0)).await;

        open_submission(&ctx.state, "s1").await.expect("open");
        assert!(close_submission(&ctx.state, "s1"));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(ctx.store.submission("s1").needs_review());
    }

    #[tokio::test(start_paused = true)]
    async fn navigating_away_keeps_the_review_flag() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(50.0)).await;
        test_support::seed_graded(&ctx.store, "s2", "a1", 2, flagged_result(60.0)).await;

        open_submission(&ctx.state, "s1").await.expect("open");
        let next = navigate_queue(&ctx.state, "a1", "s1", Direction::Next).await.expect("nav");
        assert_eq!(next.map(|row| row.submission_id), Some("s2".to_string()));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!ctx.state.auto_clear().is_pending("s1"));
        assert!(ctx.store.submission("s1").needs_review());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_edit_cancels_the_timer_and_recomputes_total() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(50.0)).await;
        open_submission(&ctx.state, "s1").await.expect("open");

        let edited = edit_detail(
            &ctx.state,
            "s1",
            "1",
            DetailEdit { score: Some(5.0), comment: Some("checked by hand".to_string()) },
        )
        .await
        .expect("edit");
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!ctx.state.auto_clear().is_pending("s1"));
        assert_eq!(edited.score, Some(10.0));
        let stored = ctx.store.submission("s1");
        let first = &stored.grading_result().expect("result").details[0];
        assert!(first.is_correct);
        assert_eq!(first.reason, "checked by hand");
        assert!(stored.needs_review());
    }

    #[tokio::test]
    async fn non_finite_edit_counts_as_zero() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(95.0)).await;

        let edited = edit_detail(
            &ctx.state,
            "s1",
            "2",
            DetailEdit { score: Some(f64::INFINITY), comment: None },
        )
        .await
        .expect("edit");

        assert_eq!(edited.score, Some(2.0));
    }

    #[tokio::test]
    async fn flag_then_unflag_restores_review_state() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(95.0)).await;

        let flagged = flag_question(&ctx.state, "s1", "1").await.expect("flag");
        let result = flagged.grading_result().expect("result");
        assert!(result.needs_review);
        assert_eq!(result.review_reasons, vec![REASON_INCONSISTENT.to_string()]);

        let unflagged = unflag_question(&ctx.state, "s1", "1").await.expect("unflag");
        let result = unflagged.grading_result().expect("result");
        assert!(!result.needs_review);
        assert!(result.review_reasons.is_empty());
        assert_ne!(result.details[0].student_answer, UNREADABLE_ANSWER);
    }

    #[tokio::test]
    async fn unflag_after_regrade_forces_unreadable() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(95.0)).await;
        flag_question(&ctx.state, "s1", "1").await.expect("flag");
        ctx.grader.push_ok(result_with(vec![detail("1", 4.0, 5.0, Some(99.0))]));
        regrade_questions(&ctx.state, "s1", None).await.expect("regrade");

        let unflagged = unflag_question(&ctx.state, "s1", "1").await.expect("unflag");

        let result = unflagged.grading_result().expect("result");
        assert_eq!(result.details[0].student_answer, UNREADABLE_ANSWER);
        assert!(result.needs_review);
        assert_eq!(result.review_reasons, vec![REASON_UNREADABLE.to_string()]);
    }

    #[tokio::test]
    async fn flagging_unknown_question_is_not_found() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(95.0)).await;

        let err = flag_question(&ctx.state, "s1", "9").await.expect_err("unknown");

        assert!(matches!(err, GradingError::NotFound(_)));
        assert!(!ctx.state.ledger().has_flags("s1"));
    }

    #[tokio::test]
    async fn queue_orders_review_rows_first_and_navigation_clamps() {
        let ctx = seeded().await;
        test_support::seed_graded(&ctx.store, "s1", "a1", 1, flagged_result(95.0)).await;
        test_support::seed_graded(&ctx.store, "s2", "a1", 2, flagged_result(70.0)).await;
        test_support::seed_graded(&ctx.store, "s3", "a1", 3, flagged_result(40.0)).await;
        test_support::seed_submission(&ctx.store, "s4", "a1", 4, SubmissionStatus::Scanned, None)
            .await;

        let rows = review_queue(&ctx.state, "a1").await.expect("queue");
        let order: Vec<&str> = rows.iter().map(|row| row.submission_id.as_str()).collect();
        assert_eq!(order, vec!["s3", "s2", "s1", "s4"]);
        assert_eq!(rows[0].review_reasons, vec![REASON_LOW_CONFIDENCE.to_string()]);
        assert_eq!(rows[0].confidence.as_ref().map(|signal| signal.value), Some(40.0));

        let next = navigate_queue(&ctx.state, "a1", "s2", Direction::Next).await.expect("nav");
        assert_eq!(next.map(|row| row.submission_id), Some("s3".to_string()));
        let past_end = navigate_queue(&ctx.state, "a1", "s3", Direction::Next).await.expect("nav");
        assert_eq!(past_end.map(|row| row.submission_id), Some("s3".to_string()));
        let before_start =
            navigate_queue(&ctx.state, "a1", "s2", Direction::Previous).await.expect("nav");
        assert_eq!(before_start.map(|row| row.submission_id), Some("s2".to_string()));
    }

    #[tokio::test]
    async fn queue_for_unknown_assignment_is_not_found() {
        let ctx = seeded().await;
        let err = review_queue(&ctx.state, "missing").await.expect_err("unknown");
        assert!(matches!(err, GradingError::NotFound(_)));
    }
}
