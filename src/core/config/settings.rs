use super::parsing::{
    confidence_percent, env_flag, env_optional, env_or_default, env_parsed, megabytes_to_bytes,
    parse_cors_origins, parse_environment, positive_seconds, redis_url, within,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, GradingSettings,
    RedisSettings, RuntimeSettings, S3Settings, ServerSettings, Settings, TelemetrySettings,
    DEFAULT_IMAGE_CACHE_TTL, DEFAULT_MAX_IMAGE_SIZE_MB, DEFAULT_REVIEW_AUTO_CLEAR,
    DEFAULT_REVIEW_CONFIDENCE_THRESHOLD,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("GRADEFLOW_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let runtime = RuntimeSettings {
            environment,
            strict_config: env_flag("GRADEFLOW_STRICT_CONFIG") || environment.is_production(),
        };

        let settings = Self {
            server: load_server()?,
            runtime,
            api: ApiSettings {
                project_name: env_or_default("PROJECT_NAME", "Gradeflow API"),
                version: env_or_default("VERSION", env!("CARGO_PKG_VERSION")),
                api_v1_str: env_or_default("API_V1_STR", "/api/v1"),
            },
            cors: CorsSettings {
                origins: parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?,
            },
            database: load_database()?,
            redis: load_redis()?,
            ai: load_ai()?,
            s3: S3Settings {
                endpoint: env_or_default("S3_ENDPOINT", "http://localhost:9000"),
                access_key: env_or_default("S3_ACCESS_KEY", ""),
                secret_key: env_or_default("S3_SECRET_KEY", ""),
                bucket: env_or_default("S3_BUCKET", "gradeflow-submissions"),
                region: env_or_default("S3_REGION", "us-east-1"),
            },
            grading: load_grading()?,
            telemetry: TelemetrySettings {
                log_level: env_or_default("GRADEFLOW_LOG_LEVEL", "info"),
                json: env_flag("GRADEFLOW_LOG_JSON"),
                prometheus_enabled: env_flag("PROMETHEUS_ENABLED"),
            },
        };

        settings.require_secrets()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    /// Strict deployments must be able to reach every collaborator.
    fn require_secrets(&self) -> Result<(), ConfigError> {
        if !self.runtime.strict_config {
            return Ok(());
        }

        if !self.database.has_credentials {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if !self.ai.is_configured() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY/OPENAI_BASE_URL"));
        }
        if !self.s3.has_credentials() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        Ok(())
    }
}

fn load_server() -> Result<ServerSettings, ConfigError> {
    let host = env_or_default("GRADEFLOW_HOST", "0.0.0.0");
    if host.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidHost(host));
    }

    let raw_port = env_or_default("GRADEFLOW_PORT", "8000");
    let port = match raw_port.parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => return Err(ConfigError::InvalidPort(raw_port)),
    };

    Ok(ServerSettings { host, port })
}

fn load_database() -> Result<DatabaseSettings, ConfigError> {
    if let Some(url) = env_optional("DATABASE_URL") {
        return Ok(DatabaseSettings { url, has_credentials: true });
    }

    let server = env_or_default("POSTGRES_SERVER", "localhost");
    let port: u16 = env_parsed("POSTGRES_PORT", 5432)?;
    let user = env_or_default("POSTGRES_USER", "gradeflow");
    let password = env_or_default("POSTGRES_PASSWORD", "");
    let db = env_or_default("POSTGRES_DB", "gradeflow");

    Ok(DatabaseSettings {
        url: format!("postgresql://{user}:{password}@{server}:{port}/{db}"),
        has_credentials: !password.is_empty(),
    })
}

fn load_redis() -> Result<RedisSettings, ConfigError> {
    let host = env_or_default("REDIS_HOST", "localhost");
    let port: u16 = env_parsed("REDIS_PORT", 6379)?;
    let db: u16 = env_parsed("REDIS_DB", 0)?;
    let password = env_optional("REDIS_PASSWORD");
    let ttl_seconds = env_parsed("IMAGE_CACHE_TTL_SECONDS", DEFAULT_IMAGE_CACHE_TTL.as_secs())?;

    Ok(RedisSettings {
        url: redis_url(&host, port, db, password.as_deref()),
        image_cache_ttl: positive_seconds("IMAGE_CACHE_TTL_SECONDS", ttl_seconds)?,
    })
}

fn load_ai() -> Result<AiSettings, ConfigError> {
    let temperature = env_parsed("AI_TEMPERATURE", 0.0)?;

    Ok(AiSettings {
        openai_api_key: env_or_default("OPENAI_API_KEY", ""),
        openai_base_url: env_or_default("OPENAI_BASE_URL", ""),
        ai_model: env_or_default("AI_MODEL", "gpt-4o"),
        ai_max_tokens: env_parsed("AI_MAX_TOKENS", 10_000)?,
        ai_request_timeout: env_parsed("AI_REQUEST_TIMEOUT", 600)?,
        ai_temperature: within("AI_TEMPERATURE", temperature, 0.0..=2.0, "within 0..=2")?,
        ai_max_retries: env_parsed("AI_MAX_RETRIES", 3)?,
    })
}

fn load_grading() -> Result<GradingSettings, ConfigError> {
    let threshold =
        env_parsed("REVIEW_CONFIDENCE_THRESHOLD", DEFAULT_REVIEW_CONFIDENCE_THRESHOLD)?;
    let dwell_seconds =
        env_parsed("REVIEW_AUTO_CLEAR_SECONDS", DEFAULT_REVIEW_AUTO_CLEAR.as_secs())?;
    let max_image_mb = env_parsed("MAX_IMAGE_SIZE_MB", DEFAULT_MAX_IMAGE_SIZE_MB)?;

    Ok(GradingSettings {
        strict: env_flag("GRADING_STRICT"),
        domain: env_or_default("GRADING_DOMAIN", "general"),
        review_confidence_threshold: confidence_percent("REVIEW_CONFIDENCE_THRESHOLD", threshold)?,
        review_auto_clear: positive_seconds("REVIEW_AUTO_CLEAR_SECONDS", dwell_seconds)?,
        max_image_bytes: megabytes_to_bytes("MAX_IMAGE_SIZE_MB", max_image_mb)?,
    })
}
