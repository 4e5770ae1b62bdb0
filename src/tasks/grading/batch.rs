use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::state::AppState;
use crate::db::models::Submission;
use crate::schemas::answer_key::AnswerKey;
use crate::schemas::grading::GradingResult;
use crate::services::image_ref::ImageRef;

use super::{acquire_image, grade_with_image, GradingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum BatchPhase {
    Preparing,
    Grading,
}

/// What to do with the rest of the batch when some pages could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ImageFailurePolicy {
    #[default]
    Continue,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ItemFailure {
    pub(crate) submission_id: String,
    pub(crate) phase: BatchPhase,
    pub(crate) message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub(crate) struct BatchOutcome {
    pub(crate) candidates: usize,
    pub(crate) success_count: usize,
    pub(crate) stopped: bool,
    pub(crate) aborted: bool,
    pub(crate) failures: Vec<ItemFailure>,
}

impl BatchOutcome {
    fn label(&self) -> &'static str {
        if self.aborted {
            "aborted"
        } else if self.stopped {
            "stopped"
        } else if self.failures.is_empty() {
            "completed"
        } else {
            "partial"
        }
    }
}

pub(crate) trait BatchObserver: Send + Sync {
    fn on_progress(&self, _phase: BatchPhase, _current: usize, _total: usize) {}

    fn on_item_complete(&self, _submission: &Submission, _result: &GradingResult) {}

    fn on_item_failed(&self, _failure: &ItemFailure) {}
}

/// Grades submissions strictly one after another.
///
/// All pages are resolved before the first grading call. `cancel` is checked
/// before each item of both phases; an in-flight grading call always finishes
/// and is stored. Per-item failures are collected, service-wide failures abort.
pub(crate) async fn grade_many(
    state: &AppState,
    submissions: Vec<Submission>,
    answer_key: &AnswerKey,
    observer: &dyn BatchObserver,
    cancel: &CancellationToken,
    on_image_failure: ImageFailurePolicy,
) -> Result<BatchOutcome, GradingError> {
    let total = submissions.len();
    let mut outcome = BatchOutcome { candidates: total, ..BatchOutcome::default() };
    let mut prepared: Vec<(Submission, ImageRef)> = Vec::with_capacity(total);

    for (index, submission) in submissions.into_iter().enumerate() {
        if cancel.is_cancelled() {
            outcome.stopped = true;
            return Ok(finish(outcome));
        }

        match acquire_image(state, &submission).await {
            Ok((image, _)) => prepared.push((submission, image)),
            Err(err @ GradingError::ImageUnavailable { .. }) => {
                let failure = ItemFailure {
                    submission_id: submission.id.clone(),
                    phase: BatchPhase::Preparing,
                    message: err.to_string(),
                };
                observer.on_item_failed(&failure);
                outcome.failures.push(failure);
            }
            Err(err) => return Err(err),
        }
        observer.on_progress(BatchPhase::Preparing, index + 1, total);
    }

    if !outcome.failures.is_empty() && on_image_failure == ImageFailurePolicy::Abort {
        tracing::warn!(
            failures = outcome.failures.len(),
            "Batch aborted after image preparation failures"
        );
        outcome.aborted = true;
        return Ok(finish(outcome));
    }

    let grading_total = prepared.len();
    for (index, (submission, image)) in prepared.into_iter().enumerate() {
        if cancel.is_cancelled() {
            outcome.stopped = true;
            break;
        }

        let submission_id = submission.id.clone();
        match grade_with_image(state, submission, answer_key, &image).await {
            Ok(graded) => {
                outcome.success_count += 1;
                if let Some(result) = graded.grading_result() {
                    observer.on_item_complete(&graded, result);
                }
            }
            Err(err) if err.is_batch_fatal() => {
                tracing::error!(submission_id = %submission_id, error = %err, "Batch aborted");
                metrics::counter!("batch_runs_total", "outcome" => "failed").increment(1);
                return Err(err);
            }
            Err(err) => {
                let failure = ItemFailure {
                    submission_id,
                    phase: BatchPhase::Grading,
                    message: err.to_string(),
                };
                observer.on_item_failed(&failure);
                outcome.failures.push(failure);
            }
        }
        observer.on_progress(BatchPhase::Grading, index + 1, grading_total);
    }

    Ok(finish(outcome))
}

fn finish(outcome: BatchOutcome) -> BatchOutcome {
    metrics::counter!("batch_runs_total", "outcome" => outcome.label()).increment(1);
    tracing::info!(
        candidates = outcome.candidates,
        success_count = outcome.success_count,
        failures = outcome.failures.len(),
        stopped = outcome.stopped,
        aborted = outcome.aborted,
        "Batch grading finished"
    );
    outcome
}
