use async_trait::async_trait;

use crate::core::redis::RedisHandle;
use crate::services::image_ref::ImageRef;

/// Short-lived page cache in front of the database and the remote store.
#[async_trait]
pub(crate) trait ImageCache: Send + Sync {
    async fn get(&self, submission_id: &str) -> Option<ImageRef>;

    async fn put(&self, submission_id: &str, image: &ImageRef);

    async fn evict(&self, submission_id: &str);
}

/// Redis-backed cache; every failure degrades to a miss.
#[derive(Clone)]
pub(crate) struct RedisImageCache {
    redis: RedisHandle,
    ttl_seconds: u64,
}

impl RedisImageCache {
    pub(crate) fn new(redis: RedisHandle, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }
}

#[async_trait]
impl ImageCache for RedisImageCache {
    async fn get(&self, submission_id: &str) -> Option<ImageRef> {
        match self.redis.cached_image(submission_id).await {
            Ok(Some(encoded)) if !encoded.is_empty() => Some(ImageRef::from_base64(&encoded)),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(submission_id, error = %err, "Image cache lookup failed");
                None
            }
        }
    }

    async fn put(&self, submission_id: &str, image: &ImageRef) {
        if let Err(err) =
            self.redis.cache_image(submission_id, image.to_base64(), self.ttl_seconds).await
        {
            tracing::warn!(submission_id, error = %err, "Failed to cache image");
        }
    }

    async fn evict(&self, submission_id: &str) {
        if let Err(err) = self.redis.evict_image(submission_id).await {
            tracing::warn!(submission_id, error = %err, "Failed to evict cached image");
        }
    }
}
