use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::SubmissionStatus;
use crate::schemas::answer_key::AnswerKey;
use crate::schemas::grading::GradingResult;
use crate::services::image_ref::ImageRef;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) classroom_id: String,
    pub(crate) title: String,
    pub(crate) answer_key: Option<Json<AnswerKey>>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) seat_number: i32,
    pub(crate) student_name: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) image_base64: Option<String>,
    pub(crate) image_sha256: Option<String>,
    pub(crate) image_remote_key: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) result: Option<Json<GradingResult>>,
    pub(crate) teacher_feedback: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Submission {
    pub(crate) fn grading_result(&self) -> Option<&GradingResult> {
        self.result.as_ref().map(|result| &result.0)
    }

    pub(crate) fn needs_review(&self) -> bool {
        self.grading_result().map(|result| result.needs_review).unwrap_or(false)
    }

    /// Locally stored encoding, if any.
    pub(crate) fn stored_image(&self) -> Option<ImageRef> {
        self.image_base64
            .as_deref()
            .filter(|encoded| !encoded.trim().is_empty())
            .map(ImageRef::from_base64)
    }
}
