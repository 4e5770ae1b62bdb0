use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// `student_answer` value meaning the grader could not read anything for the question.
pub(crate) const UNREADABLE_ANSWER: &str = "[unreadable]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Detail {
    #[serde(alias = "questionId", deserialize_with = "lenient_text")]
    pub(crate) question_id: String,
    #[serde(default, alias = "studentAnswer", deserialize_with = "lenient_text")]
    pub(crate) student_answer: String,
    #[serde(default, deserialize_with = "lenient_score")]
    pub(crate) score: f64,
    #[serde(default, alias = "maxScore", deserialize_with = "lenient_score")]
    pub(crate) max_score: f64,
    #[serde(default, alias = "isCorrect")]
    pub(crate) is_correct: bool,
    #[serde(default, alias = "comment", deserialize_with = "lenient_text")]
    pub(crate) reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_confidence")]
    pub(crate) confidence: Option<f64>,
}

impl Detail {
    pub(crate) fn derive_correctness(&mut self) {
        self.is_correct = self.max_score > 0.0 && self.score >= self.max_score;
    }

    pub(crate) fn is_unreadable(&self) -> bool {
        self.student_answer.trim() == UNREADABLE_ANSWER
    }

    pub(crate) fn mark_unreadable(&mut self) {
        self.student_answer = UNREADABLE_ANSWER.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct GradingResult {
    #[serde(default, alias = "totalScore", deserialize_with = "lenient_score")]
    pub(crate) total_score: f64,
    #[serde(default)]
    pub(crate) details: Vec<Detail>,
    #[serde(default)]
    pub(crate) mistakes: Vec<String>,
    #[serde(default)]
    pub(crate) weaknesses: Vec<String>,
    #[serde(default)]
    pub(crate) suggestions: Vec<String>,
    /// Result-level extraction confidences, used when no detail carries one.
    #[serde(default, alias = "pageConfidences")]
    pub(crate) page_confidences: Vec<f64>,
    #[serde(default, alias = "needsReview")]
    pub(crate) needs_review: bool,
    #[serde(default, alias = "reviewReasons")]
    pub(crate) review_reasons: Vec<String>,
}

impl GradingResult {
    /// Derives `is_correct` on every detail and recomputes the total from them.
    pub(crate) fn settle(&mut self) {
        for detail in &mut self.details {
            detail.derive_correctness();
        }
        self.total_score = sum_scores(&self.details);
    }

    pub(crate) fn detail_mut(&mut self, question_id: &str) -> Option<&mut Detail> {
        self.details.iter_mut().find(|detail| detail.question_id == question_id)
    }
}

/// Sum of detail scores; non-finite scores count as zero.
pub(crate) fn sum_scores(details: &[Detail]) -> f64 {
    details.iter().map(|detail| detail.score).filter(|score| score.is_finite()).sum()
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    })
}

fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(number_from(&Value::deserialize(deserializer)?).unwrap_or(0.0))
}

fn lenient_confidence<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    Ok(number_from(&Value::deserialize(deserializer)?).filter(|value| value.is_finite()))
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
