use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Acquisition status; only grading may re-enter `graded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "submissionstatus", rename_all = "snake_case")]
pub(crate) enum SubmissionStatus {
    NotSubmitted,
    Scanned,
    Synced,
    Graded,
}

impl SubmissionStatus {
    fn rank(self) -> u8 {
        match self {
            Self::NotSubmitted => 0,
            Self::Scanned => 1,
            Self::Synced => 2,
            Self::Graded => 3,
        }
    }

    /// Moves forward to `next`, never backwards.
    pub(crate) fn advance_to(self, next: Self) -> Self {
        if next.rank() > self.rank() {
            next
        } else {
            self
        }
    }

    pub(crate) fn is_pending_grade(self) -> bool {
        matches!(self, Self::Scanned | Self::Synced)
    }
}
