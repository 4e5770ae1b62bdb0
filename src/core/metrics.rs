use std::sync::OnceLock;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Grader round-trips range from a couple of seconds to several minutes.
const GRADING_DURATION_BUCKETS: &[f64] =
    &[1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0, 320.0, 600.0];

/// Installs the Prometheus recorder when enabled; a second call keeps the first recorder.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("grading_duration_seconds".to_string()),
            GRADING_DURATION_BUCKETS,
        )?
        .install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe_grading_metrics();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_grading_metrics() {
    metrics::describe_counter!("grading_jobs_total", "Full grades by status");
    metrics::describe_histogram!(
        "grading_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent grading one submission"
    );
    metrics::describe_counter!("image_acquisition_total", "Submission images resolved by source");
    metrics::describe_counter!("regrade_questions_total", "Questions sent for targeted regrade");
    metrics::describe_counter!(
        "answer_key_merge_collisions_total",
        "Question ids renamed while merging answer keys"
    );
    metrics::describe_counter!("batch_runs_total", "Grade-all runs by outcome");
}
