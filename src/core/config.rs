mod parsing;
mod settings;
mod types;

pub(crate) use types::{
    ConfigError, Environment, GradingSettings, Settings, DEFAULT_REVIEW_AUTO_CLEAR,
    DEFAULT_REVIEW_CONFIDENCE_THRESHOLD,
};
