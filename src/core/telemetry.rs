use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Dependencies that are chatty at `info`.
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "aws_config=warn", "aws_smithy_runtime=warn", "hyper=warn"];

fn default_filter(level: &str) -> String {
    std::iter::once(level).chain(QUIET_TARGETS.iter().copied()).collect::<Vec<_>>().join(",")
}

/// `RUST_LOG` takes precedence over the configured level.
pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&telemetry.log_level)));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    let installed = if telemetry.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| anyhow::anyhow!(err.to_string()))?;

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        json = telemetry.json,
        "Tracing initialized"
    );
    Ok(())
}
