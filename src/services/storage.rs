use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::core::config::Settings;

/// Object key of a submission's page in the remote store.
pub(crate) fn submission_image_key(assignment_id: &str, submission_id: &str) -> String {
    format!("submissions/{assignment_id}/{submission_id}.jpg")
}

#[async_trait]
pub(crate) trait RemoteImageStore: Send + Sync {
    async fn download_image(&self, key: &str) -> anyhow::Result<Vec<u8>>;

    async fn upload_image(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if !settings.s3().has_credentials() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "gradeflow-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(settings.s3().endpoint.clone())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let client = Client::new(&config);

        Ok(Some(Self { client, bucket: settings.s3().bucket.clone() }))
    }
}

#[async_trait]
impl RemoteImageStore for StorageService {
    async fn download_image(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to fetch object {key}"))?;

        let bytes = object
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read object body {key}"))?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn upload_image(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("image/jpeg")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("Failed to upload object {key}"))?;

        Ok(())
    }
}
