use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use super::types::{ConfigError, Environment};

const LOCAL_FRONTEND_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

/// Trimmed value of `key`; blank values count as unset.
pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn env_flag(key: &str) -> bool {
    env_optional(key).is_some_and(|value| parse_flag(&value))
}

/// Reads `key` as `T`, using `default` when it is unset.
pub(super) fn env_parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env_optional(key) {
        Some(raw) => parse_value(key, raw),
        None => Ok(default),
    }
}

pub(super) fn parse_value<T: FromStr>(field: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue { field, value: raw })
}

pub(super) fn within(
    field: &'static str,
    value: f64,
    range: RangeInclusive<f64>,
    expected: &'static str,
) -> Result<f64, ConfigError> {
    if value.is_finite() && range.contains(&value) {
        return Ok(value);
    }
    Err(ConfigError::OutOfRange { field, value: value.to_string(), expected })
}

/// Confidence cut-offs live on the grader's 0-100 scale.
pub(super) fn confidence_percent(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    within(field, value, 0.0..=100.0, "a percentage within 0..=100")
}

pub(super) fn positive_seconds(field: &'static str, seconds: u64) -> Result<Duration, ConfigError> {
    if seconds == 0 {
        return Err(ConfigError::OutOfRange {
            field,
            value: seconds.to_string(),
            expected: "at least one second",
        });
    }
    Ok(Duration::from_secs(seconds))
}

pub(super) fn megabytes_to_bytes(field: &'static str, megabytes: u64) -> Result<usize, ConfigError> {
    if megabytes == 0 {
        return Err(ConfigError::OutOfRange {
            field,
            value: megabytes.to_string(),
            expected: "at least 1 MB",
        });
    }
    let bytes = megabytes.saturating_mul(1024 * 1024);
    Ok(usize::try_from(bytes).unwrap_or(usize::MAX))
}

/// Accepts a JSON array or a comma list; trailing slashes are dropped and duplicates removed.
pub(super) fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let raw = value.unwrap_or_default();
    let trimmed = raw.trim();

    let listed: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|_| ConfigError::InvalidCors(raw.clone()))?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };

    let mut origins: Vec<String> = Vec::with_capacity(listed.len());
    for origin in listed {
        let origin = origin.trim().trim_end_matches('/').to_string();
        if !origin.is_empty() && !origins.contains(&origin) {
            origins.push(origin);
        }
    }

    if origins.is_empty() {
        return Ok(LOCAL_FRONTEND_ORIGINS.iter().map(|origin| origin.to_string()).collect());
    }
    Ok(origins)
}

pub(super) fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    let Some(value) = value else {
        return Environment::Development;
    };
    match value.to_ascii_lowercase().as_str() {
        "production" | "prod" => Environment::Production,
        "staging" => Environment::Staging,
        "test" | "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn redis_url(host: &str, port: u16, db: u16, password: Option<&str>) -> String {
    match password {
        Some(password) => format!("redis://:{password}@{host}:{port}/{db}"),
        None => format!("redis://{host}:{port}/{db}"),
    }
}
