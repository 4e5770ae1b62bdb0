use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::redis::RedisHandle;
use crate::repositories::store::GradingStore;
use crate::services::ai_grading::GradingClient;
use crate::services::image_cache::ImageCache;
use crate::services::review_autoclear::ReviewAutoClear;
use crate::services::review_ledger::ReviewLedger;
use crate::services::storage::RemoteImageStore;
use crate::tasks::jobs::BatchJobs;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn GradingStore>,
    grader: Arc<dyn GradingClient>,
    remote: Option<Arc<dyn RemoteImageStore>>,
    cache: Arc<dyn ImageCache>,
    redis: Option<RedisHandle>,
    ledger: ReviewLedger,
    auto_clear: ReviewAutoClear,
    jobs: BatchJobs,
}

/// External collaborators the grading engine runs against.
pub(crate) struct Collaborators {
    pub(crate) store: Arc<dyn GradingStore>,
    pub(crate) grader: Arc<dyn GradingClient>,
    pub(crate) remote: Option<Arc<dyn RemoteImageStore>>,
    pub(crate) cache: Arc<dyn ImageCache>,
    pub(crate) redis: Option<RedisHandle>,
}

impl AppState {
    pub(crate) fn new(settings: Settings, collaborators: Collaborators) -> Self {
        let Collaborators { store, grader, remote, cache, redis } = collaborators;
        Self {
            inner: Arc::new(InnerState {
                settings,
                store,
                grader,
                remote,
                cache,
                redis,
                ledger: ReviewLedger::new(),
                auto_clear: ReviewAutoClear::new(),
                jobs: BatchJobs::new(),
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn GradingStore> {
        &self.inner.store
    }

    pub(crate) fn grader(&self) -> &Arc<dyn GradingClient> {
        &self.inner.grader
    }

    pub(crate) fn remote(&self) -> Option<&Arc<dyn RemoteImageStore>> {
        self.inner.remote.as_ref()
    }

    pub(crate) fn cache(&self) -> &Arc<dyn ImageCache> {
        &self.inner.cache
    }

    pub(crate) fn redis(&self) -> Option<&RedisHandle> {
        self.inner.redis.as_ref()
    }

    pub(crate) fn ledger(&self) -> &ReviewLedger {
        &self.inner.ledger
    }

    pub(crate) fn auto_clear(&self) -> &ReviewAutoClear {
        &self.inner.auto_clear
    }

    pub(crate) fn jobs(&self) -> &BatchJobs {
        &self.inner.jobs
    }
}
