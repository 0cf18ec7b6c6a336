use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::gateway::sanitize_name;
use crate::models::Id;

#[derive(Debug, Error)]
pub enum PhotoStoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Object storage for event photo originals, distinct from the image CDN.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Stores bytes under `key` and returns the URL the object is served at.
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<String, PhotoStoreError>;
    async fn delete(&self, key: &str) -> Result<(), PhotoStoreError>;
}

/// `events/<event-id>/<uuid>_<sanitized original name>`
pub fn photo_key(event_id: Id, original_name: &str) -> String {
    format!("events/{}/{}_{}", event_id, uuid::Uuid::new_v4(), sanitize_name(original_name))
}

// ---------------- S3 implementation (B2 / MinIO compatible) ----------------
pub struct S3PhotoStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    public_base: String,
}

impl S3PhotoStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "ambient-frames-photos".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (B2 / MinIO / S3 endpoint)"))?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();
        // Where stored objects are readable from (CDN or the endpoint itself)
        let public_base = std::env::var("S3_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        loader = loader.endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing: required for most non-AWS endpoints without
        // wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("initialized S3 photo store (path-style addressing enabled)");

        // Ensure bucket exists (create if missing)
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) => {
                        if attempt >= max_attempts {
                            error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                            return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                        }
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }

        Ok(Self { bucket, client, public_base })
    }
}

#[async_trait]
impl PhotoStore for S3PhotoStore {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<String, PhotoStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime);
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={e:?}", self.bucket);
            let hint = if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(PhotoStoreError::Other(format!("{e}{hint}")));
        }
        Ok(format!("{}/{}", self.public_base, key))
    }

    async fn delete(&self, key: &str) -> Result<(), PhotoStoreError> {
        // Best-effort delete: treat not found as success
        let _ = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        Ok(())
    }
}

// Factory used in main; object storage is mandatory for the photo flow.
pub async fn build_photo_store() -> Arc<dyn PhotoStore> {
    match S3PhotoStore::new().await {
        Ok(store) => Arc::new(store),
        Err(e) => panic!("Failed to initialize S3 photo store: {e}"),
    }
}
