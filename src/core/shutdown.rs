use tokio::signal;

use crate::tasks::jobs::BatchJobs;

/// Resolves on Ctrl+C or SIGTERM after asking every running batch to stop.
///
/// Batches stop cooperatively, so the submission being graded is still stored.
pub(crate) async fn shutdown_signal(jobs: BatchJobs) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let stopped = jobs.stop_running();
    tracing::info!(stopped_batches = stopped, "Shutdown signal received");
}
