use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::schemas::answer_key::AnswerKey;
use crate::schemas::grading::{Detail, GradingResult, UNREADABLE_ANSWER};
use crate::services::image_ref::ImageRef;

const GRADING_SYSTEM_PROMPT: &str = r#"You are an experienced teacher grading a student's handwritten assignment.
You receive a photo of the student's page and the answer key for the assignment.

For every question in the answer key:
1. Transcribe the student's answer exactly as written, without correcting it.
2. Score it against the answer key. exact_match questions need the expected answer,
   multi_acceptable questions accept the reference answer or any listed variant,
   rubric_scored questions are scored with the rubric levels or dimensions provided.
3. Report how confident you are (0-100) that you read the answer correctly.

If you cannot read an answer at all, set student_answer to "[unreadable]" and score 0.

Respond with strict JSON only:
{
  "total_score": <number>,
  "details": [
    {
      "question_id": "<id from the answer key>",
      "student_answer": "<transcription>",
      "score": <number>,
      "max_score": <number>,
      "comment": "<short reason for the score>",
      "confidence": <0-100>
    }
  ],
  "mistakes": ["..."],
  "weaknesses": ["..."],
  "suggestions": ["..."],
  "page_confidences": [<0-100 per page>]
}
"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct RegradeRequest {
    pub(crate) question_ids: Vec<String>,
    pub(crate) previous_details: Vec<Detail>,
    /// Questions the grader should give up on rather than guess again.
    pub(crate) force_unrecognizable_question_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GradingOptions {
    pub(crate) strict: bool,
    pub(crate) domain: String,
    pub(crate) regrade: Option<RegradeRequest>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum GradingClientError {
    #[error("grading service rejected the request: {0}")]
    Rejected(String),
    #[error("grading service returned malformed data: {0}")]
    Malformed(String),
    #[error("grading service unavailable: {0}")]
    Unavailable(String),
}

impl GradingClientError {
    /// Whether the failure concerns the service as a whole rather than one submission.
    pub(crate) fn is_service_wide(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[async_trait]
pub(crate) trait GradingClient: Send + Sync {
    async fn grade_submission(
        &self,
        image: &ImageRef,
        prior: Option<&GradingResult>,
        answer_key: &AnswerKey,
        options: &GradingOptions,
    ) -> Result<GradingResult, GradingClientError>;
}

#[derive(Debug, Clone)]
pub(crate) struct AiGradingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    max_retries: u32,
}

impl AiGradingService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
            temperature: settings.ai().ai_temperature,
            max_retries: settings.ai().ai_max_retries,
        })
    }

    async fn complete(&self, payload: &Value) -> Result<Value, GradingClientError> {
        if self.base_url.is_empty() {
            return Err(GradingClientError::Unavailable("OPENAI_BASE_URL is not set".to_string()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = GradingClientError::Unavailable("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            match self.client.post(&url).bearer_auth(&self.api_key).json(payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body: Value = response.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        return Ok(body);
                    }
                    if is_permanent(status) {
                        return Err(GradingClientError::Rejected(format!("{status}: {body}")));
                    }
                    last_error = GradingClientError::Unavailable(format!("{status}: {body}"));
                }
                Err(err) => {
                    last_error = GradingClientError::Unavailable(err.to_string());
                }
            }

            if attempt < self.max_retries {
                tracing::warn!(attempt, error = %last_error, "Retrying grading request");
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl GradingClient for AiGradingService {
    async fn grade_submission(
        &self,
        image: &ImageRef,
        prior: Option<&GradingResult>,
        answer_key: &AnswerKey,
        options: &GradingOptions,
    ) -> Result<GradingResult, GradingClientError> {
        let timer = Instant::now();
        let user_prompt = build_user_prompt(prior, answer_key, options);

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": GRADING_SYSTEM_PROMPT},
                {"role": "user", "content": [
                    {"type": "text", "text": user_prompt},
                    {"type": "image_url", "image_url": {
                        "url": format!("data:image/jpeg;base64,{}", image.to_base64())
                    }}
                ]}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        tracing::info!(
            regrade = options.regrade.is_some(),
            questions = answer_key.questions().len(),
            "Sending AI grading request"
        );

        let body = self.complete(&payload).await?;
        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| GradingClientError::Malformed("missing message content".to_string()))?;

        let result = parse_grading_content(content)?;

        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(Value::as_u64);
        tracing::info!(
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used,
            details = result.details.len(),
            "AI grading completed"
        );

        Ok(result)
    }
}

fn is_permanent(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::TOO_MANY_REQUESTS
        && status != StatusCode::REQUEST_TIMEOUT
}

pub(crate) fn parse_grading_content(content: &str) -> Result<GradingResult, GradingClientError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let mut result: GradingResult = serde_json::from_str(trimmed)
        .map_err(|err| GradingClientError::Malformed(err.to_string()))?;
    result.settle();
    Ok(result)
}

fn build_user_prompt(
    prior: Option<&GradingResult>,
    answer_key: &AnswerKey,
    options: &GradingOptions,
) -> String {
    let mut prompt = format!(
        "Subject domain: {}\nGrading mode: {}\n\nAnswer key:\n{}\n",
        options.domain,
        if options.strict {
            "strict, award full marks only for complete answers"
        } else {
            "lenient, give partial credit where the rubric allows it"
        },
        serde_json::to_string_pretty(&answer_key.to_value()).unwrap_or_default()
    );

    if let Some(regrade) = &options.regrade {
        prompt.push_str(&format!(
            "\nRe-grade ONLY these questions: {}. Return details for them alone.\n\
             Previous grading of these questions:\n{}\n",
            regrade.question_ids.join(", "),
            serde_json::to_string_pretty(&regrade.previous_details).unwrap_or_default()
        ));
        if !regrade.force_unrecognizable_question_ids.is_empty() {
            prompt.push_str(&format!(
                "These questions were already re-read and still disputed: {}. \
                 Unless the answer is unambiguous, set student_answer to \"{UNREADABLE_ANSWER}\".\n",
                regrade.force_unrecognizable_question_ids.join(", ")
            ));
        }
    } else if let Some(prior) = prior {
        prompt.push_str(&format!(
            "\nThis page was graded before with a total of {}. Grade it again from scratch.\n",
            prior.total_score
        ));
    }

    prompt
}
