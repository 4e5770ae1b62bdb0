use sqlx::PgPool;

use crate::db::models::Submission;

const COLUMNS: &str = "\
    id, assignment_id, seat_number, student_name, status, image_base64, image_sha256, \
    image_remote_key, score, graded_at, result, teacher_feedback, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_assignment(
    pool: &PgPool,
    assignment_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE assignment_id = $1
         ORDER BY seat_number, id"
    ))
    .bind(assignment_id)
    .fetch_all(pool)
    .await
}

/// Whole-record write; concurrent writers race and the last one wins.
pub(crate) async fn upsert(pool: &PgPool, submission: &Submission) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO submissions (
            id, assignment_id, seat_number, student_name, status, image_base64, image_sha256,
            image_remote_key, score, graded_at, result, teacher_feedback, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         ON CONFLICT (id) DO UPDATE
         SET seat_number = EXCLUDED.seat_number,
             student_name = EXCLUDED.student_name,
             status = EXCLUDED.status,
             image_base64 = EXCLUDED.image_base64,
             image_sha256 = EXCLUDED.image_sha256,
             image_remote_key = EXCLUDED.image_remote_key,
             score = EXCLUDED.score,
             graded_at = EXCLUDED.graded_at,
             result = EXCLUDED.result,
             teacher_feedback = EXCLUDED.teacher_feedback,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(&submission.id)
    .bind(&submission.assignment_id)
    .bind(submission.seat_number)
    .bind(&submission.student_name)
    .bind(submission.status)
    .bind(&submission.image_base64)
    .bind(&submission.image_sha256)
    .bind(&submission.image_remote_key)
    .bind(submission.score)
    .bind(submission.graded_at)
    .bind(&submission.result)
    .bind(&submission.teacher_feedback)
    .bind(submission.created_at)
    .bind(submission.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}
