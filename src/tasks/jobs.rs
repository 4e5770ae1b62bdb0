use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::Submission;
use crate::schemas::answer_key::AnswerKey;
use crate::schemas::grading::GradingResult;
use crate::tasks::grading::{
    grade_many, BatchObserver, BatchOutcome, BatchPhase, GradingError, ImageFailurePolicy,
    ItemFailure,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum JobState {
    Running,
    Completed,
    Stopped,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchStatus {
    pub(crate) job_id: String,
    pub(crate) assignment_id: String,
    pub(crate) state: JobState,
    pub(crate) phase: BatchPhase,
    pub(crate) current: usize,
    pub(crate) total: usize,
    pub(crate) candidates: usize,
    pub(crate) success_count: usize,
    pub(crate) failures: Vec<ItemFailure>,
    pub(crate) completed_submission_ids: Vec<String>,
    pub(crate) error: Option<String>,
    pub(crate) started_at: String,
    pub(crate) finished_at: Option<String>,
}

/// Finished runs kept per assignment so their status stays readable.
const FINISHED_JOBS_KEPT: usize = 5;

struct JobEntry {
    status: BatchStatus,
    token: CancellationToken,
    sequence: u64,
}

#[derive(Default)]
struct JobTable {
    entries: HashMap<String, JobEntry>,
    next_sequence: u64,
}

impl JobTable {
    fn running_for(&self, assignment_id: &str) -> Option<&BatchStatus> {
        self.entries.values().map(|entry| &entry.status).find(|status| {
            status.assignment_id == assignment_id && status.state == JobState::Running
        })
    }

    /// Drops the oldest finished runs of an assignment beyond the retention cap.
    fn prune_finished(&mut self, assignment_id: &str) {
        let mut finished: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.status.assignment_id == assignment_id
                    && entry.status.state != JobState::Running
            })
            .map(|(job_id, entry)| (entry.sequence, job_id.clone()))
            .collect();
        if finished.len() <= FINISHED_JOBS_KEPT {
            return;
        }

        finished.sort_unstable();
        let excess = finished.len() - FINISHED_JOBS_KEPT;
        for (_, job_id) in finished.into_iter().take(excess) {
            self.entries.remove(&job_id);
        }
        tracing::debug!(assignment_id, evicted = excess, "Evicted finished batch jobs");
    }
}

/// Grade-all runs executing in the background, addressable by job id.
///
/// At most one run per assignment is active at a time.
#[derive(Clone, Default)]
pub(crate) struct BatchJobs {
    jobs: Arc<Mutex<JobTable>>,
}

impl BatchJobs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, JobTable> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn start(
        &self,
        state: AppState,
        assignment_id: &str,
        submissions: Vec<Submission>,
        answer_key: AnswerKey,
        on_image_failure: ImageFailurePolicy,
    ) -> Result<BatchStatus, GradingError> {
        let job_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let status = BatchStatus {
            job_id: job_id.clone(),
            assignment_id: assignment_id.to_string(),
            state: JobState::Running,
            phase: BatchPhase::Preparing,
            current: 0,
            total: submissions.len(),
            candidates: submissions.len(),
            success_count: 0,
            failures: Vec::new(),
            completed_submission_ids: Vec::new(),
            error: None,
            started_at: format_primitive(primitive_now_utc()),
            finished_at: None,
        };
        {
            let mut table = self.jobs();
            if let Some(running) = table.running_for(assignment_id) {
                return Err(GradingError::Conflict(format!(
                    "batch {} is already grading assignment {assignment_id}",
                    running.job_id
                )));
            }
            table.prune_finished(assignment_id);
            let sequence = table.next_sequence;
            table.next_sequence += 1;
            table.entries.insert(
                job_id.clone(),
                JobEntry { status: status.clone(), token: token.clone(), sequence },
            );
        }

        tracing::info!(
            job_id = %job_id,
            assignment_id,
            candidates = submissions.len(),
            "Batch grading started"
        );

        let jobs = self.clone();
        tokio::spawn(async move {
            let observer = JobObserver { jobs: jobs.clone(), job_id: job_id.clone() };
            let outcome =
                grade_many(&state, submissions, &answer_key, &observer, &token, on_image_failure)
                    .await;
            jobs.finish(&job_id, outcome);
        });

        Ok(status)
    }

    pub(crate) fn get(&self, job_id: &str) -> Option<BatchStatus> {
        self.jobs().entries.get(job_id).map(|entry| entry.status.clone())
    }

    /// Requests a cooperative stop; the item being graded still completes.
    pub(crate) fn stop(&self, job_id: &str) -> Option<BatchStatus> {
        let jobs = self.jobs();
        let entry = jobs.entries.get(job_id)?;
        entry.token.cancel();
        tracing::info!(job_id, "Batch stop requested");
        Some(entry.status.clone())
    }

    /// Stops every batch still running; returns how many were asked to stop.
    pub(crate) fn stop_running(&self) -> usize {
        let jobs = self.jobs();
        let running = jobs.entries.values().filter(|entry| entry.status.state == JobState::Running);
        let mut count = 0;
        for entry in running {
            entry.token.cancel();
            count += 1;
        }
        count
    }

    fn update(&self, job_id: &str, apply: impl FnOnce(&mut BatchStatus)) {
        if let Some(entry) = self.jobs().entries.get_mut(job_id) {
            apply(&mut entry.status);
        }
    }

    fn finish(&self, job_id: &str, outcome: Result<BatchOutcome, GradingError>) {
        let finished_at = format_primitive(primitive_now_utc());
        self.update(job_id, |status| {
            status.finished_at = Some(finished_at);
            match outcome {
                Ok(outcome) => {
                    status.state = if outcome.aborted {
                        JobState::Aborted
                    } else if outcome.stopped {
                        JobState::Stopped
                    } else {
                        JobState::Completed
                    };
                    status.candidates = outcome.candidates;
                    status.success_count = outcome.success_count;
                    status.failures = outcome.failures;
                }
                Err(err) => {
                    tracing::error!(job_id, error = %err, "Batch grading failed");
                    status.state = JobState::Failed;
                    status.error = Some(err.to_string());
                }
            }
        });
    }
}

struct JobObserver {
    jobs: BatchJobs,
    job_id: String,
}

impl BatchObserver for JobObserver {
    fn on_progress(&self, phase: BatchPhase, current: usize, total: usize) {
        self.jobs.update(&self.job_id, |status| {
            status.phase = phase;
            status.current = current;
            status.total = total;
        });
    }

    fn on_item_complete(&self, submission: &Submission, _result: &GradingResult) {
        self.jobs.update(&self.job_id, |status| {
            status.success_count += 1;
            status.completed_submission_ids.push(submission.id.clone());
        });
    }

    fn on_item_failed(&self, failure: &ItemFailure) {
        self.jobs.update(&self.job_id, |status| status.failures.push(failure.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SubmissionStatus;
    use crate::tasks::grading::load_answer_key;
    use crate::test_support::{self, detail, result_with, PAGE_BASE64};
    use serde_json::json;
    use std::time::Duration;

    async fn seeded() -> (test_support::MemoryContext, Vec<Submission>, AnswerKey) {
        let ctx = test_support::memory_context().await;
        test_support::seed_assignment(&ctx.store, "a1", json!([{"id": "1", "max_score": 2}]))
            .await;
        let mut submissions = Vec::new();
        for seat in 1..=3 {
            submissions.push(
                test_support::seed_submission(
                    &ctx.store,
                    &format!("s{seat}"),
                    "a1",
                    seat,
                    SubmissionStatus::Synced,
                    Some(PAGE_BASE64),
                )
                .await,
            );
        }
        ctx.grader.set_default(result_with(vec![detail("1", 2.0, 2.0, Some(97.0))]));
        let key = load_answer_key(&ctx.state, "a1").await.expect("key");
        (ctx, submissions, key)
    }

    async fn wait_finished(jobs: &BatchJobs, job_id: &str) -> BatchStatus {
        for _ in 0..200 {
            let status = jobs.get(job_id).expect("job");
            if status.state != JobState::Running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("batch job {job_id} did not finish");
    }

    #[tokio::test]
    async fn background_run_completes_and_reports_progress() {
        let (ctx, submissions, key) = seeded().await;
        let jobs = ctx.state.jobs().clone();

        let started = jobs
            .start(ctx.state.clone(), "a1", submissions, key, ImageFailurePolicy::Continue)
            .expect("start");
        assert_eq!(started.state, JobState::Running);

        let status = wait_finished(&jobs, &started.job_id).await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.success_count, 3);
        assert_eq!(status.candidates, 3);
        assert_eq!(status.phase, BatchPhase::Grading);
        assert_eq!(status.current, 3);
        assert_eq!(status.completed_submission_ids, vec!["s1", "s2", "s3"]);
        assert!(status.finished_at.is_some());
        assert_eq!(ctx.store.submission("s3").status, SubmissionStatus::Graded);
    }

    #[tokio::test]
    async fn stop_before_first_item_grades_nothing() {
        let (ctx, submissions, key) = seeded().await;
        let jobs = ctx.state.jobs().clone();

        let started = jobs
            .start(ctx.state.clone(), "a1", submissions, key, ImageFailurePolicy::Continue)
            .expect("start");
        assert!(jobs.stop(&started.job_id).is_some());

        let status = wait_finished(&jobs, &started.job_id).await;
        assert_eq!(status.state, JobState::Stopped);
        assert_eq!(status.success_count, 0);
        assert!(ctx.grader.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_running_cancels_only_active_jobs() {
        let (ctx, submissions, key) = seeded().await;
        let jobs = ctx.state.jobs().clone();
        let first = jobs
            .start(
                ctx.state.clone(),
                "a1",
                submissions.clone(),
                key.clone(),
                ImageFailurePolicy::Continue,
            )
            .expect("start");
        wait_finished(&jobs, &first.job_id).await;

        let second = jobs
            .start(ctx.state.clone(), "a1", submissions, key, ImageFailurePolicy::Continue)
            .expect("start");
        assert_eq!(jobs.stop_running(), 1);
        assert_eq!(wait_finished(&jobs, &second.job_id).await.state, JobState::Stopped);
    }

    #[tokio::test]
    async fn second_run_for_same_assignment_is_refused_while_running() {
        let (ctx, submissions, key) = seeded().await;
        let jobs = ctx.state.jobs().clone();

        let first = jobs
            .start(
                ctx.state.clone(),
                "a1",
                submissions.clone(),
                key.clone(),
                ImageFailurePolicy::Continue,
            )
            .expect("start");
        let err = jobs
            .start(ctx.state.clone(), "a1", submissions, key, ImageFailurePolicy::Continue)
            .expect_err("already running");
        assert!(matches!(err, GradingError::Conflict(_)));

        assert_eq!(wait_finished(&jobs, &first.job_id).await.state, JobState::Completed);
        assert_eq!(ctx.grader.calls().len(), 3);
    }

    #[tokio::test]
    async fn oldest_finished_runs_are_evicted() {
        let (ctx, submissions, key) = seeded().await;
        let jobs = ctx.state.jobs().clone();

        let mut job_ids = Vec::new();
        for _ in 0..=FINISHED_JOBS_KEPT {
            let started = jobs
                .start(
                    ctx.state.clone(),
                    "a1",
                    submissions.clone(),
                    key.clone(),
                    ImageFailurePolicy::Continue,
                )
                .expect("start");
            wait_finished(&jobs, &started.job_id).await;
            job_ids.push(started.job_id);
        }
        assert!(jobs.get(&job_ids[0]).is_some());

        let latest = jobs
            .start(ctx.state.clone(), "a1", submissions, key, ImageFailurePolicy::Continue)
            .expect("start");

        assert!(jobs.get(&job_ids[0]).is_none());
        assert!(jobs.get(&job_ids[1]).is_some());
        assert_eq!(jobs.get(&latest.job_id).map(|status| status.state), Some(JobState::Running));
        wait_finished(&jobs, &latest.job_id).await;
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let jobs = BatchJobs::new();
        assert!(jobs.get("missing").is_none());
        assert!(jobs.stop("missing").is_none());
    }
}
