//! Canonicalization of answer keys.
//!
//! Answer keys reach the service in several shapes: the canonical one written by
//! this crate, camelCase records produced by older clients, bare question arrays,
//! and string category tags (`truefalse`, `fill`, ...). Normalization never fails;
//! anything unusable is coerced to an empty or zero value.

use serde_json::{Map, Value};

use crate::schemas::answer_key::{
    AnswerKey, LevelRubric, Question, QuestionCategory, QuestionKind, RubricDimension,
    RubricLevel, RubricScoring, ScoreRange,
};

const EXCELLENT_PERCENT: u64 = 90;
const GOOD_PERCENT: u64 = 70;
const FAIR_PERCENT: u64 = 50;

pub(crate) fn normalize_answer_key(raw: &Value) -> AnswerKey {
    let questions = match raw {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("questions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    AnswerKey::new(
        questions.iter().enumerate().map(|(index, item)| normalize_question(index, item)).collect(),
    )
}

/// Re-runs normalization over an already typed key.
pub(crate) fn renormalize(key: &AnswerKey) -> AnswerKey {
    normalize_answer_key(&key.to_value())
}

fn normalize_question(index: usize, raw: &Value) -> Question {
    let empty = Map::new();
    let record = raw.as_object().unwrap_or(&empty);

    let id = normalize_question_id(
        index,
        &text_field(record, &["id", "question_id", "questionId", "number"]),
    );
    let category = resolve_category(first_field(record, &["type", "category", "questionType"]));
    let max_score = coerce_score(first_field(record, &["max_score", "maxScore", "score", "points"]));
    let needs_reanalysis = first_field(record, &["needs_reanalysis", "needsReanalysis"])
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let kind = match category {
        QuestionCategory::ExactMatch => QuestionKind::ExactMatch {
            answer: text_field(
                record,
                &["answer", "correct_answer", "correctAnswer", "expected_answer"],
            ),
            answer_format: Some(text_field(record, &["answer_format", "answerFormat"]))
                .filter(|format| !format.is_empty()),
        },
        QuestionCategory::MultiAcceptable => QuestionKind::MultiAcceptable {
            reference_answer: reference_answer(record),
            acceptable_answers: text_list(first_field(
                record,
                &["acceptable_answers", "acceptableAnswers", "alternatives"],
            )),
        },
        QuestionCategory::RubricScored => QuestionKind::RubricScored {
            reference_answer: reference_answer(record),
            scoring: rubric_scoring(record, max_score),
        },
    };

    Question { id, max_score, kind, needs_reanalysis }
}

/// Trims, fills blanks with the 1-based position and drops the legacy `q` prefix.
pub(crate) fn normalize_question_id(index: usize, raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (index + 1).to_string();
    }

    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some('q' | 'Q'), Some(second)) if second.is_ascii_digit() => trimmed[1..].to_string(),
        _ => trimmed.to_string(),
    }
}

pub(crate) fn resolve_category(raw: Option<&Value>) -> QuestionCategory {
    match raw {
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(QuestionCategory::from_numeric_tag)
            .unwrap_or(QuestionCategory::RubricScored),
        Some(Value::String(tag)) => {
            let tag = tag.trim().to_ascii_lowercase();
            if let Some(category) = QuestionCategory::from_canonical(&tag) {
                return category;
            }
            if let Some(category) =
                tag.parse::<i64>().ok().and_then(QuestionCategory::from_numeric_tag)
            {
                return category;
            }
            legacy_category(&tag)
        }
        _ => QuestionCategory::RubricScored,
    }
}

fn legacy_category(tag: &str) -> QuestionCategory {
    match tag {
        "truefalse" | "choice" => QuestionCategory::ExactMatch,
        "fill" | "short" | "short_sentence" => QuestionCategory::MultiAcceptable,
        _ => QuestionCategory::RubricScored,
    }
}

/// Four-level rubric over `[1, floor(max_score)]` with 90/70/50% floors.
///
/// Each floor is a ceiling division of the integral maximum and is clamped below
/// the next level up, so levels never overlap. A level squeezed out entirely on
/// small maxima has no range.
pub(crate) fn generate_rubric(max_score: f64, criteria: Option<[String; 4]>) -> LevelRubric {
    let top = integral_max(max_score);
    let [excellent_text, good_text, fair_text, needs_work_text] = criteria.unwrap_or_default();

    let mut ceiling = top;
    let excellent = take_level(&mut ceiling, ceil_percent(top, EXCELLENT_PERCENT));
    let good = take_level(&mut ceiling, ceil_percent(top, GOOD_PERCENT));
    let fair = take_level(&mut ceiling, ceil_percent(top, FAIR_PERCENT));
    let needs_work = take_level(&mut ceiling, 1);

    LevelRubric {
        excellent: RubricLevel { range: excellent, criteria: excellent_text },
        good: RubricLevel { range: good, criteria: good_text },
        fair: RubricLevel { range: fair, criteria: fair_text },
        needs_work: RubricLevel { range: needs_work, criteria: needs_work_text },
    }
}

fn integral_max(max_score: f64) -> u64 {
    if max_score.is_finite() && max_score >= 1.0 {
        max_score.floor().min(u32::MAX as f64) as u64
    } else {
        0
    }
}

fn ceil_percent(top: u64, percent: u64) -> u64 {
    (top * percent).div_ceil(100)
}

/// Claims `[floor, ceiling]` (floor clamped into range) and lowers the ceiling below it.
fn take_level(ceiling: &mut u64, floor: u64) -> Option<ScoreRange> {
    if *ceiling < 1 {
        return None;
    }
    let min = floor.clamp(1, *ceiling);
    let range = ScoreRange { min: min as u32, max: *ceiling as u32 };
    *ceiling = min - 1;
    Some(range)
}

fn rubric_scoring(record: &Map<String, Value>, max_score: f64) -> RubricScoring {
    let dimensions = first_field(
        record,
        &["rubric_dimensions", "rubricsDimensions", "rubricDimensions", "dimensions"],
    )
    .and_then(Value::as_array)
    .map(|items| items.iter().filter_map(normalize_dimension).collect::<Vec<_>>())
    .unwrap_or_default();

    if !dimensions.is_empty() {
        return RubricScoring::Dimensions(dimensions);
    }

    let criteria = record.get("rubric").and_then(Value::as_object).map(|rubric| {
        [
            level_criteria(rubric, &["excellent"]),
            level_criteria(rubric, &["good"]),
            level_criteria(rubric, &["fair"]),
            level_criteria(rubric, &["needs_work", "needsWork", "needsImprovement"]),
        ]
    });

    RubricScoring::Levels(generate_rubric(max_score, criteria))
}

fn normalize_dimension(raw: &Value) -> Option<RubricDimension> {
    let record = raw.as_object()?;
    Some(RubricDimension {
        name: text_field(record, &["name", "title"]),
        max_score: coerce_score(first_field(record, &["max_score", "maxScore", "score"])),
        criteria: text_field(record, &["criteria", "description"]),
    })
}

fn level_criteria(rubric: &Map<String, Value>, keys: &[&str]) -> String {
    match first_field(rubric, keys) {
        Some(Value::Object(level)) => text_field(level, &["criteria", "description"]),
        Some(other) => coerce_text(other),
        None => String::new(),
    }
}

fn reference_answer(record: &Map<String, Value>) -> String {
    text_field(
        record,
        &["reference_answer", "referenceAnswer", "answer", "correct_answer", "correctAnswer"],
    )
}

fn first_field<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| record.get(*key).filter(|value| !value.is_null()))
}

fn text_field(record: &Map<String, Value>, keys: &[&str]) -> String {
    first_field(record, keys).map(coerce_text).unwrap_or_default()
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => {
            items.iter().map(coerce_text).filter(|item| !item.trim().is_empty()).collect()
        }
        Some(Value::String(text)) if !text.trim().is_empty() => vec![text.clone()],
        _ => Vec::new(),
    }
}

/// Finite, non-negative; anything else becomes 0.
pub(crate) fn coerce_score(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(score) if score.is_finite() && score > 0.0 => score,
        _ => 0.0,
    }
}
