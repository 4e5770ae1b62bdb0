use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-submission teacher flags and regrade attempt counters.
#[derive(Clone, Default)]
pub(crate) struct ReviewLedger {
    inner: Arc<Mutex<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    flags: HashMap<String, BTreeSet<String>>,
    attempts: HashMap<(String, String), u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UnflagOutcome {
    pub(crate) was_flagged: bool,
    /// The question was already regraded at least once.
    pub(crate) force_unreadable: bool,
}

impl ReviewLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` when the question was already flagged.
    pub(crate) fn flag(&self, submission_id: &str, question_id: &str) -> bool {
        self.state()
            .flags
            .entry(submission_id.to_string())
            .or_default()
            .insert(question_id.to_string())
    }

    pub(crate) fn unflag(&self, submission_id: &str, question_id: &str) -> UnflagOutcome {
        let mut state = self.state();

        let was_flagged = state
            .flags
            .get_mut(submission_id)
            .map(|questions| questions.remove(question_id))
            .unwrap_or(false);
        if state.flags.get(submission_id).is_some_and(BTreeSet::is_empty) {
            state.flags.remove(submission_id);
        }

        let attempts = state
            .attempts
            .get(&(submission_id.to_string(), question_id.to_string()))
            .copied()
            .unwrap_or(0);

        UnflagOutcome { was_flagged, force_unreadable: attempts > 0 }
    }

    pub(crate) fn flagged(&self, submission_id: &str) -> Vec<String> {
        self.state()
            .flags
            .get(submission_id)
            .map(|questions| questions.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_flags(&self, submission_id: &str) -> bool {
        self.state().flags.get(submission_id).map(|questions| !questions.is_empty()).unwrap_or(false)
    }

    pub(crate) fn attempts(&self, submission_id: &str, question_id: &str) -> u32 {
        self.state()
            .attempts
            .get(&(submission_id.to_string(), question_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn record_attempts(&self, submission_id: &str, question_ids: &[String]) {
        let mut state = self.state();
        for question_id in question_ids {
            *state
                .attempts
                .entry((submission_id.to_string(), question_id.clone()))
                .or_insert(0) += 1;
        }
    }

    /// Drops every flag and counter of a submission.
    pub(crate) fn reset(&self, submission_id: &str) {
        let mut state = self.state();
        state.flags.remove(submission_id);
        state.attempts.retain(|(submission, _), _| submission != submission_id);
    }
}
