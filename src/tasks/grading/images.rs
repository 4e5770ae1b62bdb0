use crate::core::state::AppState;
use crate::db::models::Submission;
use crate::services::image_ref::ImageRef;
use crate::services::storage::submission_image_key;

use super::GradingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageSource {
    Cache,
    Stored,
    Remote,
}

impl ImageSource {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Stored => "stored",
            Self::Remote => "remote",
        }
    }
}

/// Resolves a submission's page: cache, then the stored encoding, then the remote store.
pub(crate) async fn acquire_image(
    state: &AppState,
    submission: &Submission,
) -> Result<(ImageRef, ImageSource), GradingError> {
    if let Some(image) = state.cache().get(&submission.id).await {
        if is_usable(&image) {
            return Ok(record(image, ImageSource::Cache));
        }
        state.cache().evict(&submission.id).await;
    }

    if let Some(image) = submission.stored_image() {
        if is_usable(&image) {
            state.cache().put(&submission.id, &image).await;
            return Ok(record(image, ImageSource::Stored));
        }
        tracing::warn!(submission_id = %submission.id, "Stored image encoding is not decodable");
    }

    if let Some(remote) = state.remote() {
        let key = submission
            .image_remote_key
            .clone()
            .unwrap_or_else(|| submission_image_key(&submission.assignment_id, &submission.id));

        match remote.download_image(&key).await {
            Ok(bytes) if !bytes.is_empty() => {
                let image = ImageRef::from_bytes(bytes);
                state.cache().put(&submission.id, &image).await;
                return Ok(record(image, ImageSource::Remote));
            }
            Ok(_) => {
                tracing::warn!(submission_id = %submission.id, key = %key, "Remote image is empty");
            }
            Err(err) => {
                tracing::warn!(
                    submission_id = %submission.id,
                    key = %key,
                    error = %err,
                    "Remote image download failed"
                );
            }
        }
    }

    metrics::counter!("image_acquisition_total", "source" => "unavailable").increment(1);
    Err(GradingError::ImageUnavailable { submission_id: submission.id.clone() })
}

fn is_usable(image: &ImageRef) -> bool {
    !image.is_empty() && image.to_bytes().map(|bytes| !bytes.is_empty()).unwrap_or(false)
}

fn record(image: ImageRef, source: ImageSource) -> (ImageRef, ImageSource) {
    metrics::counter!("image_acquisition_total", "source" => source.as_str()).increment(1);
    (image, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SubmissionStatus;
    use crate::services::image_ref::ImageRef;
    use crate::test_support::{self, PAGE_BASE64};

    #[tokio::test]
    async fn cache_wins_over_stored_and_remote() {
        let ctx = test_support::memory_context().await;
        let submission = test_support::seed_submission(
            &ctx.store,
            "s1",
            "a1",
            1,
            SubmissionStatus::Scanned,
            Some(PAGE_BASE64),
        )
        .await;
        ctx.state.cache().put("s1", &ImageRef::from_bytes(b"cached".to_vec())).await;

        let (image, source) = acquire_image(&ctx.state, &submission).await.expect("image");

        assert_eq!(source, ImageSource::Cache);
        assert_eq!(image.to_bytes().expect("bytes"), b"cached");
        assert_eq!(ctx.remote.downloads(), 0);
    }

    #[tokio::test]
    async fn stored_encoding_is_used_and_cached() {
        let ctx = test_support::memory_context().await;
        let submission = test_support::seed_submission(
            &ctx.store,
            "s1",
            "a1",
            1,
            SubmissionStatus::Scanned,
            Some(PAGE_BASE64),
        )
        .await;

        let (image, source) = acquire_image(&ctx.state, &submission).await.expect("image");

        assert_eq!(source, ImageSource::Stored);
        assert_eq!(image.to_bytes().expect("bytes"), b"page");
        assert!(ctx.cache.contains("s1"));
        assert_eq!(ctx.remote.downloads(), 0);
    }

    #[tokio::test]
    async fn undecodable_encoding_falls_through_to_remote() {
        let ctx = test_support::memory_context().await;
        let submission = test_support::seed_submission(
            &ctx.store,
            "s1",
            "a1",
            1,
            SubmissionStatus::Synced,
            Some("%%%"),
        )
        .await;
        ctx.remote.insert("submissions/a1/s1.jpg", b"remote page");

        let (image, source) = acquire_image(&ctx.state, &submission).await.expect("image");

        assert_eq!(source, ImageSource::Remote);
        assert_eq!(image.to_bytes().expect("bytes"), b"remote page");
        assert_eq!(ctx.remote.downloads(), 1);
    }

    #[tokio::test]
    async fn missing_everywhere_is_image_unavailable() {
        let ctx = test_support::memory_context().await;
        let submission =
            test_support::seed_submission(&ctx.store, "s1", "a1", 1, SubmissionStatus::Scanned, None)
                .await;

        let err = acquire_image(&ctx.state, &submission).await.expect_err("unavailable");

        assert!(matches!(err, GradingError::ImageUnavailable { ref submission_id } if submission_id == "s1"));
        assert_eq!(ctx.remote.downloads(), 1);
    }
}
