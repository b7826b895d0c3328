//! S3-compatible object store (MinIO in the default deployment).
//!
//! Buckets and keys map one-to-one onto the remote service. Credentials
//! come from configuration; when they are blank the standard AWS
//! credential chain (env vars, `~/.aws/credentials`, IAM role, etc.)
//! applies.

use aws_sdk_s3::Client;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::{ObjectStore, PutObjectInfo, StoredObject};
use crate::config::S3StorageConfig;

/// Object store backed by an S3-compatible service.
pub struct S3ObjectStore {
    /// AWS S3 SDK client.
    client: Client,
}

impl S3ObjectStore {
    /// Build the SDK client for the configured endpoint.
    pub async fn new(config: &S3StorageConfig) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "streamraft-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style)
            .build();

        info!(
            "S3 object store initialized: endpoint={} region={}",
            config.endpoint_url, config.region
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
        })
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("S3 {context}: {err}")
    }
}

impl ObjectStore for S3ObjectStore {
    fn ensure_bucket(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            if self.client.head_bucket().bucket(&bucket).send().await.is_ok() {
                debug!("S3 bucket {} already exists", bucket);
                return Ok(());
            }
            self.client
                .create_bucket()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("create_bucket", e))?;
            info!("Created S3 bucket {}", bucket);
            Ok(())
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<PutObjectInfo>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let size = data.len() as u64;
            debug!("S3 put_object: bucket={} key={} size={}", bucket, key, size);

            self.client
                .put_object()
                .bucket(&bucket)
                .key(&key)
                .content_type(content_type)
                .body(aws_sdk_s3::primitives::ByteStream::from(data))
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("put_object", e))?;

            Ok(PutObjectInfo { size })
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredObject>>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("S3 get_object: bucket={} key={}", bucket, key);

            let resp = match self.client.get_object().bucket(&bucket).key(&key).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        return Ok(None);
                    }
                    return Err(Self::map_sdk_error("get_object", service_err));
                }
            };

            let content_type = resp
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = resp
                .body
                .collect()
                .await
                .map_err(|e| Self::map_sdk_error("get_object body", e))?
                .into_bytes();

            Ok(Some(StoredObject { data, content_type }))
        })
    }

    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("S3 delete_object: bucket={} key={}", bucket, key);
            // S3 delete_object is idempotent -- no error for missing keys.
            self.client
                .delete_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("delete_object", e))?;
            Ok(())
        })
    }
}
