mod batch;
mod capture;
mod images;
mod regrade;
mod review;
mod selection;
mod single;

use crate::services::ai_grading::GradingClientError;

pub(crate) use batch::{
    grade_many, BatchObserver, BatchOutcome, BatchPhase, ImageFailurePolicy, ItemFailure,
};
pub(crate) use capture::{capture_image, create_submission, sync_image, NewSubmission};
pub(crate) use images::{acquire_image, ImageSource};
pub(crate) use regrade::{regrade_questions, RegradeOutcome};
pub(crate) use review::{
    clear_review_if_pending, close_submission, edit_detail, flag_question, navigate_queue,
    open_submission, review_queue, unflag_question, DetailEdit,
};
pub(crate) use selection::{select_for_grade_all, GradeAllSelection};
pub(crate) use single::{grade_one, grade_with_image, load_answer_key};

#[derive(Debug, thiserror::Error)]
pub(crate) enum GradingError {
    #[error("no usable image for submission {submission_id}")]
    ImageUnavailable { submission_id: String },
    #[error("grading failed for submission {submission_id}: {source}")]
    GradingService {
        submission_id: String,
        #[source]
        source: GradingClientError,
    },
    #[error("{0}")]
    NotGradable(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("remote image storage is not configured")]
    StorageDisabled,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl GradingError {
    /// Failures that make every remaining batch item pointless.
    pub(crate) fn is_batch_fatal(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::GradingService { source, .. } => source.is_service_wide(),
            _ => false,
        }
    }
}
