use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::schemas::grading::{Detail, GradingResult};

pub(crate) const DEFAULT_REVIEW_CONFIDENCE_THRESHOLD: f64 = 80.0;

pub(crate) const REASON_LOW_CONFIDENCE: &str = "low confidence";
pub(crate) const REASON_UNREADABLE: &str = "question unreadable";
pub(crate) const REASON_INCONSISTENT: &str = "answer possibly inconsistent";

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ReviewVerdict {
    pub(crate) needs_review: bool,
    pub(crate) reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ConfidenceSignal {
    pub(crate) value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) question_id: Option<String>,
}

/// Lowest finite detail confidence, clamped to `[0, 100]`.
///
/// Falls back to the mean of the page-level confidences when no detail has one.
pub(crate) fn min_confidence(
    details: &[Detail],
    page_confidences: &[f64],
) -> Option<ConfidenceSignal> {
    let lowest = details
        .iter()
        .filter_map(|detail| {
            detail.confidence.filter(|value| value.is_finite()).map(|value| (value, detail))
        })
        .min_by(|(left, _), (right, _)| left.partial_cmp(right).unwrap_or(Ordering::Equal));

    if let Some((value, detail)) = lowest {
        return Some(ConfidenceSignal {
            value: value.clamp(0.0, 100.0),
            question_id: Some(detail.question_id.clone()),
        });
    }

    let finite: Vec<f64> = page_confidences.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    Some(ConfidenceSignal { value: mean.clamp(0.0, 100.0), question_id: None })
}

pub(crate) fn compute_needs_review(
    result: &GradingResult,
    has_outstanding_flags: bool,
    threshold: f64,
) -> ReviewVerdict {
    let mut reasons = Vec::new();

    let low_confidence = min_confidence(&result.details, &result.page_confidences)
        .map(|signal| signal.value < threshold)
        .unwrap_or(false);
    if low_confidence {
        reasons.push(REASON_LOW_CONFIDENCE.to_string());
    }
    if result.details.iter().any(Detail::is_unreadable) {
        reasons.push(REASON_UNREADABLE.to_string());
    }
    if has_outstanding_flags {
        reasons.push(REASON_INCONSISTENT.to_string());
    }

    ReviewVerdict { needs_review: !reasons.is_empty(), reasons }
}

/// Writes the verdict into the result and returns it.
pub(crate) fn apply_triage(
    result: &mut GradingResult,
    has_outstanding_flags: bool,
    threshold: f64,
) -> ReviewVerdict {
    let verdict = compute_needs_review(result, has_outstanding_flags, threshold);
    result.needs_review = verdict.needs_review;
    result.review_reasons = verdict.reasons.clone();
    verdict
}

/// One submission as the review grid sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct TriageRow {
    pub(crate) submission_id: String,
    pub(crate) seat_number: i32,
    pub(crate) student_name: String,
    pub(crate) needs_review: bool,
    pub(crate) review_reasons: Vec<String>,
    pub(crate) confidence: Option<ConfidenceSignal>,
}

/// Needs-review rows first by (confidence, seat); the rest by seat.
pub(crate) fn order_for_grid(rows: &mut [TriageRow]) {
    rows.sort_by(compare_rows);
}

fn compare_rows(left: &TriageRow, right: &TriageRow) -> Ordering {
    match (left.needs_review, right.needs_review) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => compare_confidence(left, right)
            .then_with(|| left.seat_number.cmp(&right.seat_number)),
        (false, false) => left.seat_number.cmp(&right.seat_number),
    }
}

fn compare_confidence(left: &TriageRow, right: &TriageRow) -> Ordering {
    match (&left.confidence, &right.confidence) {
        (Some(a), Some(b)) => a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Direction {
    Next,
    Previous,
}

/// Steps through the needs-review rows in seat order, stopping at either end.
///
/// When `current` is not itself awaiting review, the step starts from its seat.
pub(crate) fn navigate<'a>(
    rows: &'a [TriageRow],
    current: &str,
    direction: Direction,
) -> Option<&'a TriageRow> {
    let mut queue: Vec<&TriageRow> = rows.iter().filter(|row| row.needs_review).collect();
    queue.sort_by_key(|row| row.seat_number);
    if queue.is_empty() {
        return None;
    }
    let last = queue.len() - 1;

    if let Some(index) = queue.iter().position(|row| row.submission_id == current) {
        let target = match direction {
            Direction::Next => (index + 1).min(last),
            Direction::Previous => index.saturating_sub(1),
        };
        return Some(queue[target]);
    }

    let Some(seat) = rows.iter().find(|row| row.submission_id == current).map(|row| row.seat_number)
    else {
        return Some(queue[0]);
    };

    let target = match direction {
        Direction::Next => queue.iter().find(|row| row.seat_number > seat).unwrap_or(&queue[last]),
        Direction::Previous => {
            queue.iter().rev().find(|row| row.seat_number < seat).unwrap_or(&queue[0])
        }
    };
    Some(*target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::grading::UNREADABLE_ANSWER;

    fn detail(id: &str, confidence: Option<f64>) -> Detail {
        Detail {
            question_id: id.to_string(),
            student_answer: "42".to_string(),
            score: 1.0,
            max_score: 1.0,
            is_correct: true,
            reason: String::new(),
            confidence,
        }
    }

    fn result(details: Vec<Detail>) -> GradingResult {
        GradingResult { details, ..GradingResult::default() }
    }

    fn row(id: &str, seat: i32, needs_review: bool, confidence: Option<f64>) -> TriageRow {
        TriageRow {
            submission_id: id.to_string(),
            seat_number: seat,
            student_name: String::new(),
            needs_review,
            review_reasons: Vec::new(),
            confidence: confidence.map(|value| ConfidenceSignal { value, question_id: None }),
        }
    }

    #[test]
    fn low_confidence_detail_triggers_review() {
        let result = result(vec![detail("1", Some(95.0)), detail("2", Some(60.0))]);

        let verdict = compute_needs_review(&result, false, DEFAULT_REVIEW_CONFIDENCE_THRESHOLD);
        let signal = min_confidence(&result.details, &[]).expect("signal");

        assert!(verdict.needs_review);
        assert!(verdict.reasons.contains(&REASON_LOW_CONFIDENCE.to_string()));
        assert_eq!(signal.value, 60.0);
        assert_eq!(signal.question_id.as_deref(), Some("2"));
    }

    #[test]
    fn confident_readable_unflagged_result_is_clean() {
        let result = result(vec![detail("1", Some(80.0)), detail("2", None)]);
        let verdict = compute_needs_review(&result, false, DEFAULT_REVIEW_CONFIDENCE_THRESHOLD);
        assert_eq!(verdict, ReviewVerdict::default());
    }

    #[test]
    fn unreadable_and_flags_each_add_a_reason() {
        let mut unreadable = detail("1", Some(99.0));
        unreadable.student_answer = UNREADABLE_ANSWER.to_string();

        let verdict =
            compute_needs_review(&result(vec![unreadable]), true, DEFAULT_REVIEW_CONFIDENCE_THRESHOLD);

        assert!(verdict.needs_review);
        assert_eq!(
            verdict.reasons,
            vec![REASON_UNREADABLE.to_string(), REASON_INCONSISTENT.to_string()]
        );
    }

    #[test]
    fn min_confidence_clamps_and_ignores_non_finite() {
        let details = vec![detail("1", Some(f64::NAN)), detail("2", Some(-5.0))];
        let signal = min_confidence(&details, &[]).expect("signal");
        assert_eq!(signal.value, 0.0);
        assert_eq!(signal.question_id.as_deref(), Some("2"));
    }

    #[test]
    fn min_confidence_falls_back_to_page_mean() {
        let details = vec![detail("1", None)];
        let signal = min_confidence(&details, &[70.0, 90.0, f64::INFINITY]).expect("signal");
        assert_eq!(signal.value, 80.0);
        assert_eq!(signal.question_id, None);

        assert_eq!(min_confidence(&details, &[]), None);
    }

    #[test]
    fn apply_triage_writes_verdict_into_result() {
        let mut result = result(vec![detail("1", Some(10.0))]);
        apply_triage(&mut result, false, 50.0);
        assert!(result.needs_review);
        assert_eq!(result.review_reasons, vec![REASON_LOW_CONFIDENCE.to_string()]);

        apply_triage(&mut result, false, 5.0);
        assert!(!result.needs_review);
        assert!(result.review_reasons.is_empty());
    }

    #[test]
    fn grid_order_puts_review_first_by_confidence_then_seat() {
        let mut rows = vec![
            row("a", 1, false, None),
            row("b", 2, true, Some(70.0)),
            row("c", 3, true, None),
            row("d", 4, true, Some(40.0)),
            row("e", 5, true, Some(70.0)),
            row("f", 0, false, Some(10.0)),
        ];

        order_for_grid(&mut rows);

        let ids: Vec<&str> = rows.iter().map(|row| row.submission_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "e", "c", "f", "a"]);
    }

    #[test]
    fn navigation_is_clamped_at_both_ends() {
        let rows = vec![
            row("s3", 3, true, Some(10.0)),
            row("s1", 1, true, Some(90.0)),
            row("s2", 2, false, None),
            row("s5", 5, true, Some(50.0)),
        ];

        assert_eq!(navigate(&rows, "s1", Direction::Next).map(|r| r.seat_number), Some(3));
        assert_eq!(navigate(&rows, "s5", Direction::Next).map(|r| r.seat_number), Some(5));
        assert_eq!(navigate(&rows, "s1", Direction::Previous).map(|r| r.seat_number), Some(1));
        assert_eq!(navigate(&rows, "s2", Direction::Next).map(|r| r.seat_number), Some(3));
        assert_eq!(navigate(&rows, "s2", Direction::Previous).map(|r| r.seat_number), Some(1));
        assert_eq!(navigate(&rows, "missing", Direction::Next).map(|r| r.seat_number), Some(1));
    }

    #[test]
    fn navigation_without_review_items_returns_none() {
        let rows = vec![row("s1", 1, false, None)];
        assert!(navigate(&rows, "s1", Direction::Next).is_none());
    }
}
