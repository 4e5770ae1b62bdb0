use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::{Assignment, Submission};
use crate::repositories;

/// Persistence boundary of the grading engine. Writes replace the whole record.
#[async_trait]
pub(crate) trait GradingStore: Send + Sync {
    async fn find_assignment(&self, id: &str) -> Result<Option<Assignment>>;

    async fn list_assignments(&self, classroom_id: &str) -> Result<Vec<Assignment>>;

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()>;

    async fn find_submission(&self, id: &str) -> Result<Option<Submission>>;

    async fn list_submissions(&self, assignment_id: &str) -> Result<Vec<Submission>>;

    async fn save_submission(&self, submission: &Submission) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GradingStore for PgStore {
    async fn find_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        repositories::assignments::find_by_id(&self.pool, id)
            .await
            .context("Failed to fetch assignment")
    }

    async fn list_assignments(&self, classroom_id: &str) -> Result<Vec<Assignment>> {
        repositories::assignments::list_by_classroom(&self.pool, classroom_id)
            .await
            .context("Failed to list assignments")
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        repositories::assignments::upsert(&self.pool, assignment)
            .await
            .context("Failed to save assignment")
    }

    async fn find_submission(&self, id: &str) -> Result<Option<Submission>> {
        repositories::submissions::find_by_id(&self.pool, id)
            .await
            .context("Failed to fetch submission")
    }

    async fn list_submissions(&self, assignment_id: &str) -> Result<Vec<Submission>> {
        repositories::submissions::list_by_assignment(&self.pool, assignment_id)
            .await
            .context("Failed to list submissions")
    }

    async fn save_submission(&self, submission: &Submission) -> Result<()> {
        repositories::submissions::upsert(&self.pool, submission)
            .await
            .context("Failed to save submission")
    }

    async fn ping(&self) -> Result<()> {
        repositories::health::ping(&self.pool).await.context("Database ping failed")
    }
}
