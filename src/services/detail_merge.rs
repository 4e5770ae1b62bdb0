use std::collections::HashMap;

use crate::schemas::grading::{sum_scores, Detail};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergedDetails {
    pub(crate) details: Vec<Detail>,
    pub(crate) total_score: f64,
    /// Targeted questions the regrade came back without.
    pub(crate) missing_targets: Vec<String>,
}

/// Patches a regrade result into the existing details by question id.
///
/// Existing details keep their position; a regrade detail for an id the
/// submission did not have yet is appended in the order the grader returned it.
pub(crate) fn merge_regrade(
    existing: &[Detail],
    regrade: &[Detail],
    targeted_question_ids: &[String],
) -> MergedDetails {
    let mut replacements: HashMap<&str, &Detail> = HashMap::new();
    let mut appended: Vec<&Detail> = Vec::new();

    for detail in regrade {
        let known = existing.iter().any(|current| current.question_id == detail.question_id);
        if known {
            replacements.insert(detail.question_id.as_str(), detail);
        } else if !appended.iter().any(|other| other.question_id == detail.question_id) {
            appended.push(detail);
        }
    }

    let mut details: Vec<Detail> = existing
        .iter()
        .map(|current| match replacements.get(current.question_id.as_str()) {
            Some(patch) => overlay(current, patch),
            None => current.clone(),
        })
        .collect();

    for detail in appended {
        let mut detail = detail.clone();
        detail.derive_correctness();
        details.push(detail);
    }

    let missing_targets = targeted_question_ids
        .iter()
        .filter(|id| !regrade.iter().any(|detail| &detail.question_id == *id))
        .cloned()
        .collect();

    let total_score = sum_scores(&details);
    MergedDetails { details, total_score, missing_targets }
}

/// Regrade fields win; fields the grader left out keep their old value.
fn overlay(current: &Detail, patch: &Detail) -> Detail {
    let max_score = if patch.max_score > 0.0 { patch.max_score } else { current.max_score };
    let mut merged = Detail {
        question_id: current.question_id.clone(),
        student_answer: patch.student_answer.clone(),
        score: patch.score,
        max_score,
        is_correct: false,
        reason: if patch.reason.is_empty() { current.reason.clone() } else { patch.reason.clone() },
        confidence: patch.confidence.or(current.confidence),
    };
    merged.derive_correctness();
    merged
}
