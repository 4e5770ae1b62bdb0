use std::cmp::Ordering;
use std::collections::HashSet;

use crate::schemas::answer_key::{AnswerKey, Question};
use crate::services::answer_key::renormalize;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergeOutcome {
    pub(crate) answer_key: AnswerKey,
    pub(crate) notice: Option<String>,
    pub(crate) renamed: Vec<(String, String)>,
}

/// Appends `incoming` after `current`, renaming colliding ids to `<id>-2`, `<id>-3`, ...
pub(crate) fn merge_answer_keys(current: Option<&AnswerKey>, incoming: &AnswerKey) -> MergeOutcome {
    let current = current.map(renormalize).unwrap_or_default();
    let incoming = renormalize(incoming);

    let mut taken: HashSet<String> = HashSet::new();
    let mut questions: Vec<Question> = Vec::new();
    let mut renamed = Vec::new();

    for mut question in current.into_questions().into_iter().chain(incoming.into_questions()) {
        if taken.contains(&question.id) {
            let replacement = first_free_suffix(&question.id, &taken);
            renamed.push((question.id.clone(), replacement.clone()));
            question.id = replacement;
        }
        taken.insert(question.id.clone());
        questions.push(question);
    }

    if !renamed.is_empty() {
        metrics::counter!("answer_key_merge_collisions_total").increment(renamed.len() as u64);
        tracing::info!(renamed = renamed.len(), "Renamed colliding question ids during merge");
    }

    let notice = collision_notice(&renamed);
    MergeOutcome { answer_key: AnswerKey::new(questions), notice, renamed }
}

fn first_free_suffix(id: &str, taken: &HashSet<String>) -> String {
    (2u64..)
        .map(|suffix| format!("{id}-{suffix}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{id}-{}", taken.len() + 2))
}

fn collision_notice(renamed: &[(String, String)]) -> Option<String> {
    if renamed.is_empty() {
        return None;
    }

    let pairs = renamed
        .iter()
        .map(|(from, to)| format!("{from} -> {to}"))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "{} duplicate question id(s) were renamed to keep every question: {pairs}",
        renamed.len()
    ))
}

/// Stable sort by hierarchical id path; equal paths keep insertion order.
pub(crate) fn sort_by_question_path(key: &AnswerKey) -> AnswerKey {
    let mut questions = key.questions().to_vec();
    questions.sort_by(|left, right| compare_question_paths(&left.id, &right.id));
    AnswerKey::new(questions)
}

pub(crate) fn compare_question_paths(left: &str, right: &str) -> Ordering {
    let mut left_segments = left.split('-');
    let mut right_segments = right.split('-');

    loop {
        match (left_segments.next(), right_segments.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(left), Some(right)) => {
                let ordering = compare_segments(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn compare_segments(left: &str, right: &str) -> Ordering {
    match (numeric_segment(left), numeric_segment(right)) {
        (Some(a), Some(b)) => a.cmp(&b).then_with(|| left.len().cmp(&right.len())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => natural_compare(left, right),
    }
}

fn numeric_segment(segment: &str) -> Option<u128> {
    if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let digits = segment.trim_start_matches('0');
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok().or(Some(u128::MAX))
}

/// Case-insensitive comparison where embedded digit runs compare by value.
fn natural_compare(left: &str, right: &str) -> Ordering {
    let mut left_chars = left.chars().peekable();
    let mut right_chars = right.chars().peekable();

    loop {
        match (left_chars.peek().copied(), right_chars.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) if a.is_ascii_digit() && b.is_ascii_digit() => {
                let left_run = take_digits(&mut left_chars);
                let right_run = take_digits(&mut right_chars);
                let ordering = numeric_segment(&left_run)
                    .cmp(&numeric_segment(&right_run))
                    .then_with(|| left_run.len().cmp(&right_run.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(a), Some(b)) => {
                let ordering = a.to_lowercase().cmp(b.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left_chars.next();
                right_chars.next();
            }
        }
    }

    left.cmp(right)
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        run.push(c);
        chars.next();
    }
    run
}
