use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::types::SubmissionStatus;
use crate::schemas::grading::GradingResult;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmissionCreate {
    #[serde(alias = "seatNumber")]
    #[validate(range(min = 1, message = "seat_number must be positive"))]
    pub(crate) seat_number: i32,
    #[serde(alias = "studentName")]
    #[validate(length(min = 1, message = "student_name must not be empty"))]
    pub(crate) student_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ImageCapture {
    #[serde(alias = "imageBase64", alias = "image")]
    #[validate(length(min = 1, message = "image_base64 must not be empty"))]
    pub(crate) image_base64: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RegradeBody {
    #[serde(default, alias = "questionIds")]
    pub(crate) question_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) seat_number: i32,
    pub(crate) student_name: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) has_image: bool,
    pub(crate) image_remote_key: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) graded_at: Option<String>,
    pub(crate) needs_review: bool,
    pub(crate) review_reasons: Vec<String>,
    pub(crate) result: Option<GradingResult>,
    pub(crate) teacher_feedback: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl SubmissionResponse {
    pub(crate) fn from_db(submission: crate::db::models::Submission) -> Self {
        let has_image =
            submission.stored_image().is_some() || submission.image_remote_key.is_some();
        let result = submission.result.map(|result| result.0);
        Self {
            id: submission.id,
            assignment_id: submission.assignment_id,
            seat_number: submission.seat_number,
            student_name: submission.student_name,
            status: submission.status,
            has_image,
            image_remote_key: submission.image_remote_key,
            score: submission.score,
            graded_at: submission.graded_at.map(format_primitive),
            needs_review: result.as_ref().map(|result| result.needs_review).unwrap_or(false),
            review_reasons: result
                .as_ref()
                .map(|result| result.review_reasons.clone())
                .unwrap_or_default(),
            result,
            teacher_feedback: submission.teacher_feedback,
            created_at: format_primitive(submission.created_at),
            updated_at: format_primitive(submission.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RegradeResponse {
    pub(crate) submission: SubmissionResponse,
    pub(crate) targeted: Vec<String>,
    pub(crate) missing_targets: Vec<String>,
}
