pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{
    config::Settings,
    redis::RedisHandle,
    state::{AppState, Collaborators},
    telemetry,
};
use crate::repositories::store::PgStore;
use crate::services::ai_grading::AiGradingService;
use crate::services::image_cache::RedisImageCache;
use crate::services::storage::{RemoteImageStore, StorageService};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().url.clone());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; continuing without cache");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let remote = match StorageService::from_settings(&settings).await? {
        Some(storage) => Some(Arc::new(storage) as Arc<dyn RemoteImageStore>),
        None => {
            tracing::warn!("S3 credentials are not set; remote image storage disabled");
            None
        }
    };
    let grader = AiGradingService::from_settings(&settings)?;
    let cache = RedisImageCache::new(redis.clone(), settings.redis().image_cache_ttl.as_secs());

    let state = AppState::new(
        settings,
        Collaborators {
            store: Arc::new(PgStore::new(db_pool)),
            grader: Arc::new(grader),
            remote,
            cache: Arc::new(cache),
            redis: Some(redis.clone()),
        },
    );

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        review_threshold = state.settings().grading().review_confidence_threshold,
        "Gradeflow API listening"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_signal(state.jobs().clone()))
        .await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
