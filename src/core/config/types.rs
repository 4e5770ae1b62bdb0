use std::time::Duration;

use thiserror::Error;

pub(crate) use crate::services::review_triage::DEFAULT_REVIEW_CONFIDENCE_THRESHOLD;

/// How long an opened submission may sit on screen before its review flag is cleared.
pub(crate) const DEFAULT_REVIEW_AUTO_CLEAR: Duration = Duration::from_secs(5);
pub(super) const DEFAULT_MAX_IMAGE_SIZE_MB: u64 = 10;
pub(super) const DEFAULT_IMAGE_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) server: ServerSettings,
    pub(super) runtime: RuntimeSettings,
    pub(super) api: ApiSettings,
    pub(super) cors: CorsSettings,
    pub(super) database: DatabaseSettings,
    pub(super) redis: RedisSettings,
    pub(super) ai: AiSettings,
    pub(super) s3: S3Settings,
    pub(super) grading: GradingSettings,
    pub(super) telemetry: TelemetrySettings,
}

/// Policy knobs for grading and the review grid.
#[derive(Debug, Clone)]
pub(crate) struct GradingSettings {
    /// Asks the grader for exact-answer matching instead of lenient reading.
    pub(crate) strict: bool,
    /// Subject hint passed to the grader prompt.
    pub(crate) domain: String,
    /// Confidences strictly below this (0-100) put a submission up for review.
    pub(crate) review_confidence_threshold: f64,
    pub(crate) review_auto_clear: Duration,
    pub(crate) max_image_bytes: usize,
}

/// Connection to the grading model.
#[derive(Debug, Clone)]
pub(crate) struct AiSettings {
    pub(crate) openai_api_key: String,
    pub(crate) openai_base_url: String,
    pub(crate) ai_model: String,
    pub(crate) ai_max_tokens: u32,
    pub(crate) ai_request_timeout: u64,
    pub(crate) ai_temperature: f64,
    pub(crate) ai_max_retries: u32,
}

impl AiSettings {
    pub(super) fn is_configured(&self) -> bool {
        !self.openai_api_key.is_empty() && !self.openai_base_url.is_empty()
    }
}

/// Bucket holding synced submission pages; empty keys disable remote storage.
#[derive(Debug, Clone)]
pub(crate) struct S3Settings {
    pub(crate) endpoint: String,
    pub(crate) access_key: String,
    pub(crate) secret_key: String,
    pub(crate) bucket: String,
    pub(crate) region: String,
}

impl S3Settings {
    pub(crate) fn has_credentials(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

/// Redis backs the short-lived image cache only.
#[derive(Debug, Clone)]
pub(crate) struct RedisSettings {
    pub(crate) url: String,
    pub(crate) image_cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(crate) url: String,
    /// False when neither `DATABASE_URL` nor `POSTGRES_PASSWORD` was given.
    pub(crate) has_credentials: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    pub(super) host: String,
    pub(super) port: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) project_name: String,
    pub(crate) version: String,
    pub(crate) api_v1_str: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid server host: {0:?}")]
    InvalidHost(String),
    #[error("invalid server port: {0}")]
    InvalidPort(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange { field: &'static str, value: String, expected: &'static str },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}
