use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::services::answer_key::{generate_rubric, normalize_answer_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum QuestionCategory {
    ExactMatch,
    MultiAcceptable,
    RubricScored,
}

impl QuestionCategory {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::MultiAcceptable => "multi_acceptable",
            Self::RubricScored => "rubric_scored",
        }
    }

    pub(crate) fn numeric_tag(self) -> u8 {
        match self {
            Self::ExactMatch => 1,
            Self::MultiAcceptable => 2,
            Self::RubricScored => 3,
        }
    }

    pub(crate) fn from_numeric_tag(tag: i64) -> Option<Self> {
        match tag {
            1 => Some(Self::ExactMatch),
            2 => Some(Self::MultiAcceptable),
            3 => Some(Self::RubricScored),
            _ => None,
        }
    }

    pub(crate) fn from_canonical(tag: &str) -> Option<Self> {
        match tag {
            "exact_match" => Some(Self::ExactMatch),
            "multi_acceptable" => Some(Self::MultiAcceptable),
            "rubric_scored" => Some(Self::RubricScored),
            _ => None,
        }
    }
}

/// Inclusive integral score band of one rubric level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ScoreRange {
    pub(crate) min: u32,
    pub(crate) max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RubricLevel {
    pub(crate) range: Option<ScoreRange>,
    #[serde(default)]
    pub(crate) criteria: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LevelRubric {
    pub(crate) excellent: RubricLevel,
    pub(crate) good: RubricLevel,
    pub(crate) fair: RubricLevel,
    pub(crate) needs_work: RubricLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RubricDimension {
    pub(crate) name: String,
    pub(crate) max_score: f64,
    #[serde(default)]
    pub(crate) criteria: String,
}

/// Rubric-Scored questions carry exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RubricScoring {
    Levels(LevelRubric),
    Dimensions(Vec<RubricDimension>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum QuestionKind {
    ExactMatch { answer: String, answer_format: Option<String> },
    MultiAcceptable { reference_answer: String, acceptable_answers: Vec<String> },
    RubricScored { reference_answer: String, scoring: RubricScoring },
}

impl QuestionKind {
    pub(crate) fn category(&self) -> QuestionCategory {
        match self {
            Self::ExactMatch { .. } => QuestionCategory::ExactMatch,
            Self::MultiAcceptable { .. } => QuestionCategory::MultiAcceptable,
            Self::RubricScored { .. } => QuestionCategory::RubricScored,
        }
    }

    /// Empty payload for a category; Rubric-Scored starts from a generated rubric.
    pub(crate) fn empty(category: QuestionCategory, max_score: f64) -> Self {
        match category {
            QuestionCategory::ExactMatch => {
                Self::ExactMatch { answer: String::new(), answer_format: None }
            }
            QuestionCategory::MultiAcceptable => Self::MultiAcceptable {
                reference_answer: String::new(),
                acceptable_answers: Vec::new(),
            },
            QuestionCategory::RubricScored => Self::RubricScored {
                reference_answer: String::new(),
                scoring: RubricScoring::Levels(generate_rubric(max_score, None)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) max_score: f64,
    pub(crate) kind: QuestionKind,
    pub(crate) needs_reanalysis: bool,
}

impl Question {
    pub(crate) fn category(&self) -> QuestionCategory {
        self.kind.category()
    }
}

/// Ordered questions plus a total that is always derived from them.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct AnswerKey {
    questions: Vec<Question>,
    total_score: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("question {0} not found in answer key")]
pub(crate) struct UnknownQuestion(pub(crate) String);

impl AnswerKey {
    pub(crate) fn new(questions: Vec<Question>) -> Self {
        let total_score = sum_max_scores(&questions);
        Self { questions, total_score }
    }

    pub(crate) fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub(crate) fn total_score(&self) -> f64 {
        self.total_score
    }

    pub(crate) fn into_questions(self) -> Vec<Question> {
        self.questions
    }

    pub(crate) fn find(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == question_id)
    }

    pub(crate) fn reanalysis_question_ids(&self) -> Vec<String> {
        self.questions
            .iter()
            .filter(|question| question.needs_reanalysis)
            .map(|question| question.id.clone())
            .collect()
    }

    /// Re-categorizing wipes the old payload and marks the question for re-analysis.
    pub(crate) fn change_category(
        &mut self,
        question_id: &str,
        category: QuestionCategory,
    ) -> Result<(), UnknownQuestion> {
        let question = self
            .questions
            .iter_mut()
            .find(|question| question.id == question_id)
            .ok_or_else(|| UnknownQuestion(question_id.to_string()))?;

        question.kind = QuestionKind::empty(category, question.max_score);
        question.needs_reanalysis = true;
        self.total_score = sum_max_scores(&self.questions);
        Ok(())
    }

    pub(crate) fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn sum_max_scores(questions: &[Question]) -> f64 {
    questions.iter().map(|question| question.max_score).sum()
}

#[derive(Serialize)]
struct QuestionRecord<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    category: &'static str,
    max_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer_format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_answer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    acceptable_answers: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rubric: Option<&'a LevelRubric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rubric_dimensions: Option<&'a [RubricDimension]>,
    needs_reanalysis: bool,
}

impl Serialize for Question {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = QuestionRecord {
            id: &self.id,
            category: self.category().as_str(),
            max_score: self.max_score,
            answer: None,
            answer_format: None,
            reference_answer: None,
            acceptable_answers: None,
            rubric: None,
            rubric_dimensions: None,
            needs_reanalysis: self.needs_reanalysis,
        };

        match &self.kind {
            QuestionKind::ExactMatch { answer, answer_format } => {
                record.answer = Some(answer);
                record.answer_format = answer_format.as_deref();
            }
            QuestionKind::MultiAcceptable { reference_answer, acceptable_answers } => {
                record.reference_answer = Some(reference_answer);
                record.acceptable_answers = Some(acceptable_answers);
            }
            QuestionKind::RubricScored { reference_answer, scoring } => {
                record.reference_answer = Some(reference_answer);
                match scoring {
                    RubricScoring::Levels(rubric) => record.rubric = Some(rubric),
                    RubricScoring::Dimensions(dimensions) => {
                        record.rubric_dimensions = Some(dimensions)
                    }
                }
            }
        }

        record.serialize(serializer)
    }
}

#[derive(Serialize)]
struct AnswerKeyRecord<'a> {
    questions: &'a [Question],
    total_score: f64,
}

impl Serialize for AnswerKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        AnswerKeyRecord { questions: &self.questions, total_score: self.total_score }
            .serialize(serializer)
    }
}

/// Any JSON shape deserializes; the normalizer coerces it into canonical form.
impl<'de> Deserialize<'de> for AnswerKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(normalize_answer_key(&raw))
    }
}
