use sqlx::PgPool;

use crate::db::models::Assignment;

const COLUMNS: &str = "id, classroom_id, title, answer_key, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS}
         FROM assignments
         WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_classroom(
    pool: &PgPool,
    classroom_id: &str,
) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS}
         FROM assignments
         WHERE classroom_id = $1
         ORDER BY created_at, id"
    ))
    .bind(classroom_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn upsert(pool: &PgPool, assignment: &Assignment) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO assignments (id, classroom_id, title, answer_key, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (id) DO UPDATE
         SET classroom_id = EXCLUDED.classroom_id,
             title = EXCLUDED.title,
             answer_key = EXCLUDED.answer_key,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(&assignment.id)
    .bind(&assignment.classroom_id)
    .bind(&assignment.title)
    .bind(&assignment.answer_key)
    .bind(assignment.created_at)
    .bind(assignment.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}
