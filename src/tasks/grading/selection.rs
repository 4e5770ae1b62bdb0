use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

#[derive(Debug, Clone)]
pub(crate) enum GradeAllSelection {
    /// Scanned or synced submissions awaiting their first grade.
    Pending(Vec<Submission>),
    /// Nothing pending; every graded submission would be overwritten.
    RegradeAll(Vec<Submission>),
    Empty,
}

impl GradeAllSelection {
    pub(crate) fn requires_confirmation(&self) -> bool {
        matches!(self, Self::RegradeAll(_))
    }

    pub(crate) fn into_submissions(self) -> Vec<Submission> {
        match self {
            Self::Pending(items) | Self::RegradeAll(items) => items,
            Self::Empty => Vec::new(),
        }
    }
}

pub(crate) fn select_for_grade_all(submissions: Vec<Submission>) -> GradeAllSelection {
    let (pending, rest): (Vec<Submission>, Vec<Submission>) =
        submissions.into_iter().partition(|submission| submission.status.is_pending_grade());
    if !pending.is_empty() {
        return GradeAllSelection::Pending(pending);
    }

    let graded: Vec<Submission> = rest
        .into_iter()
        .filter(|submission| submission.status == SubmissionStatus::Graded)
        .collect();
    if graded.is_empty() {
        GradeAllSelection::Empty
    } else {
        GradeAllSelection::RegradeAll(graded)
    }
}
