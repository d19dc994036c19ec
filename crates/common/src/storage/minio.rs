//! MinIO document source over the S3 API.

use super::DocumentSource;
use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use tracing::{debug, info};

/// Document source backed by a MinIO (or any S3-compatible) bucket
pub struct MinioSource {
    client: S3Client,
    bucket: String,
    endpoint: String,
}

impl MinioSource {
    /// Create a client with static credentials and path-style addressing
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let scheme = if config.secure { "https" } else { "http" };
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "lorehunt-static",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(format!("{}://{}", scheme, config.endpoint))
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!(endpoint = %config.endpoint, bucket = %config.bucket, "MinIO source configured");

        Ok(Self::with_client(
            S3Client::from_conf(s3_config),
            config.bucket.clone(),
            config.endpoint.clone(),
        ))
    }

    /// Create with an existing S3 client
    pub fn with_client(client: S3Client, bucket: String, endpoint: String) -> Self {
        Self {
            client,
            bucket,
            endpoint,
        }
    }
}

#[async_trait]
impl DocumentSource for MinioSource {
    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| AppError::DocumentSource {
                    message: format!("Failed to list bucket {}: {}", self.bucket, e),
                })?;

            names.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter(|key| !key.ends_with('/'))
                    .map(str::to_string),
            );

            continuation = page.next_continuation_token().map(str::to_string);
            if !page.is_truncated().unwrap_or(false) || continuation.is_none() {
                break;
            }
        }

        debug!(bucket = %self.bucket, count = names.len(), "Listed documents");
        Ok(names)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| AppError::DocumentSource {
                message: format!("Failed to read {}: {}", name, e),
            })?;

        let body = object.body.collect().await.map_err(|e| AppError::DocumentSource {
            message: format!("Failed to stream {}: {}", name, e),
        })?;

        Ok(body.into_bytes().to_vec())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
