use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::schemas::answer_key::{AnswerKey, QuestionCategory};
use crate::services::review_triage::Direction;
use crate::tasks::grading::ImageFailurePolicy;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignmentCreate {
    #[serde(alias = "classroomId")]
    #[validate(length(min = 1, message = "classroom_id must not be empty"))]
    pub(crate) classroom_id: String,
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default, alias = "answerKey")]
    pub(crate) answer_key: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) classroom_id: String,
    pub(crate) title: String,
    pub(crate) answer_key: Option<AnswerKey>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl AssignmentResponse {
    pub(crate) fn from_db(assignment: crate::db::models::Assignment) -> Self {
        Self {
            id: assignment.id,
            classroom_id: assignment.classroom_id,
            title: assignment.title,
            answer_key: assignment.answer_key.map(|key| key.0),
            created_at: format_primitive(assignment.created_at),
            updated_at: format_primitive(assignment.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerKeyMergeRequest {
    /// Raw incoming questions; any shape the normalizer accepts.
    pub(crate) questions: serde_json::Value,
    #[serde(default, alias = "sortById")]
    pub(crate) sort_by_id: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RenamedQuestion {
    pub(crate) from: String,
    pub(crate) to: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeyMergeResponse {
    pub(crate) answer_key: AnswerKey,
    pub(crate) notice: Option<String>,
    pub(crate) renamed: Vec<RenamedQuestion>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryUpdate {
    pub(crate) category: QuestionCategory,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GradeAllRequest {
    /// Must be set to overwrite existing results when nothing is pending.
    #[serde(default)]
    pub(crate) confirm: bool,
    #[serde(default, alias = "onImageFailure")]
    pub(crate) on_image_failure: ImageFailurePolicy,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavigateQuery {
    pub(crate) from: String,
    pub(crate) direction: Direction,
}
