use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;
use crate::services::image_ref::ImageRef;
use crate::services::storage::submission_image_key;

use super::GradingError;

#[derive(Debug, Clone)]
pub(crate) struct NewSubmission {
    pub(crate) seat_number: i32,
    pub(crate) student_name: String,
}

pub(crate) async fn create_submission(
    state: &AppState,
    assignment_id: &str,
    new: NewSubmission,
) -> Result<Submission, GradingError> {
    if state.store().find_assignment(assignment_id).await?.is_none() {
        return Err(GradingError::NotFound(format!("assignment {assignment_id}")));
    }
    let taken = state
        .store()
        .list_submissions(assignment_id)
        .await?
        .iter()
        .any(|submission| submission.seat_number == new.seat_number);
    if taken {
        return Err(GradingError::Conflict(format!(
            "seat {} already has a submission",
            new.seat_number
        )));
    }

    let now = primitive_now_utc();
    let submission = Submission {
        id: Uuid::new_v4().to_string(),
        assignment_id: assignment_id.to_string(),
        seat_number: new.seat_number,
        student_name: new.student_name.trim().to_string(),
        status: SubmissionStatus::NotSubmitted,
        image_base64: None,
        image_sha256: None,
        image_remote_key: None,
        score: None,
        graded_at: None,
        result: None,
        teacher_feedback: None,
        created_at: now,
        updated_at: now,
    };
    state.store().save_submission(&submission).await?;
    tracing::info!(
        submission_id = %submission.id,
        assignment_id,
        seat_number = submission.seat_number,
        "Submission created"
    );
    Ok(submission)
}

/// Stores a scanned page locally and marks the submission scanned.
pub(crate) async fn capture_image(
    state: &AppState,
    submission_id: &str,
    image_base64: &str,
) -> Result<Submission, GradingError> {
    let mut submission = state
        .store()
        .find_submission(submission_id)
        .await?
        .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;

    let image = ImageRef::from_base64(image_base64);
    let size = image.byte_len().map_err(|err| GradingError::InvalidImage(err.to_string()))?;
    if size == 0 {
        return Err(GradingError::InvalidImage("image is empty".to_string()));
    }
    let limit = state.settings().grading().max_image_bytes;
    if size > limit {
        return Err(GradingError::InvalidImage(format!(
            "image is {size} bytes, the limit is {limit}"
        )));
    }
    let sha256 = image.sha256_hex().map_err(|err| GradingError::InvalidImage(err.to_string()))?;

    let now = primitive_now_utc();
    submission.image_base64 = Some(image.to_base64().to_string());
    submission.image_sha256 = Some(sha256);
    submission.status = submission.status.advance_to(SubmissionStatus::Scanned);
    submission.updated_at = now;
    state.store().save_submission(&submission).await?;
    state.cache().put(&submission.id, &image).await;

    tracing::info!(submission_id, bytes = size, "Image captured");
    Ok(submission)
}

/// Uploads the locally stored page to the remote store.
pub(crate) async fn sync_image(
    state: &AppState,
    submission_id: &str,
) -> Result<Submission, GradingError> {
    let remote = state.remote().ok_or(GradingError::StorageDisabled)?;
    let mut submission = state
        .store()
        .find_submission(submission_id)
        .await?
        .ok_or_else(|| GradingError::NotFound(format!("submission {submission_id}")))?;

    let image = match submission.stored_image() {
        Some(image) => Some(image),
        None => state.cache().get(&submission.id).await,
    }
    .filter(|image| !image.is_empty())
    .ok_or_else(|| GradingError::ImageUnavailable { submission_id: submission_id.to_string() })?;

    let bytes = image.to_bytes().map_err(|err| GradingError::InvalidImage(err.to_string()))?;
    let sha256 = image.sha256_hex().map_err(|err| GradingError::InvalidImage(err.to_string()))?;
    let key = submission_image_key(&submission.assignment_id, &submission.id);
    remote.upload_image(&key, bytes.to_vec()).await?;

    submission.image_remote_key = Some(key);
    submission.image_sha256 = Some(sha256);
    submission.status = submission.status.advance_to(SubmissionStatus::Synced);
    submission.updated_at = primitive_now_utc();
    state.store().save_submission(&submission).await?;

    tracing::info!(submission_id, "Image synced to remote storage");
    Ok(submission)
}
