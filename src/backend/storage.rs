use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{BackendClient, BackendError, check};

/// Bucketed object storage with public read URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, bucket: &str, path: &str, content_type: &str, data: Bytes) -> Result<(), BackendError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[async_trait]
impl ObjectStorage for BackendClient {
    async fn put(&self, bucket: &str, path: &str, content_type: &str, data: Bytes) -> Result<(), BackendError> {
        self.upload(bucket, path, content_type, data).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        BackendClient::public_url(self, bucket, path)
    }
}

impl BackendClient {
    /// Uploads an object, overwriting any existing object at `path`.
    pub async fn upload(&self, bucket: &str, path: &str, content_type: &str, data: Bytes) -> Result<(), BackendError> {
        debug!(bucket, path, size = data.len(), "storage upload");
        let url = format!("{}/storage/v1/object/{}/{}", self.url, bucket, path);
        let request = self
            .authorized(self.http.post(url))
            .header("Content-Type", content_type)
            .header("Cache-Control", "max-age=3600")
            .header("x-upsert", "true")
            .body(data);
        check(request.send().await?).await?;
        Ok(())
    }

    /// Public URL of an object in a public bucket. No network call.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.url, bucket, path)
    }
}
