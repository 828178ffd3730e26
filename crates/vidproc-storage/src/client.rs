//! S3-compatible object storage client.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Connection settings shared by both video buckets.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint URL (e.g. `https://storage.googleapis.com`); SDK default when unset
    pub endpoint_url: Option<String>,
    /// Static access key ID; the SDK credential chain is used when unset
    pub access_key_id: Option<String>,
    /// Static secret access key
    pub secret_access_key: Option<String>,
    /// Region ("auto" for GCS interoperability and R2)
    pub region: String,
    /// Bucket receiving raw uploads
    pub raw_bucket: String,
    /// Bucket receiving processed videos
    pub processed_bucket: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let optional = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Ok(Self {
            endpoint_url: optional("STORAGE_ENDPOINT_URL"),
            access_key_id: optional("STORAGE_ACCESS_KEY_ID"),
            secret_access_key: optional("STORAGE_SECRET_ACCESS_KEY"),
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
            raw_bucket: optional("RAW_VIDEO_BUCKET")
                .ok_or_else(|| StorageError::config_error("RAW_VIDEO_BUCKET not set"))?,
            processed_bucket: optional("PROCESSED_VIDEO_BUCKET")
                .ok_or_else(|| StorageError::config_error("PROCESSED_VIDEO_BUCKET not set"))?,
        })
    }
}

/// Client bound to a single bucket.
#[derive(Clone)]
pub struct ObjectStorageClient {
    client: Client,
    bucket: String,
}

impl ObjectStorageClient {
    /// Build the SDK client described by `config`, bound to `bucket`.
    pub async fn connect(config: &StorageConfig, bucket: impl Into<String>) -> StorageResult<Self> {
        let builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials = Credentials::new(key_id, secret, None, None, "static");
                Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .credentials_provider(credentials)
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                Builder::from(&shared)
            }
            _ => {
                return Err(StorageError::config_error(
                    "STORAGE_ACCESS_KEY_ID and STORAGE_SECRET_ACCESS_KEY must be set together",
                ))
            }
        };

        let builder = match &config.endpoint_url {
            Some(url) => builder.endpoint_url(url),
            None => builder,
        };

        let client = Client::from_conf(builder.force_path_style(true).build());

        Ok(Self {
            client,
            bucket: bucket.into(),
        })
    }

    /// Same SDK client, bound to another bucket.
    pub fn for_bucket(&self, bucket: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a file.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}/{}", path.display(), self.bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {} to {}/{}", path.display(), self.bucket, key);
        Ok(())
    }

    /// Stream an object into a local file, creating parent directories.
    pub async fn download_file(&self, key: &str, path: impl AsRef<Path>) -> StorageResult<u64> {
        let path = path.as_ref();
        debug!("Downloading {}/{} to {}", self.bucket, key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(format!("{}/{}", self.bucket, key))
                } else {
                    StorageError::download_failed(DisplayErrorContext(&e).to_string())
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::download_failed(format!("Failed to create directory: {}", e))
            })?;
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to create file: {}", e)))?;
        let mut body = response.body.into_async_read();

        let written = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to write file: {}", e)))?;

        info!(
            "Downloaded {}/{} to {} ({} bytes)",
            self.bucket,
            key,
            path.display(),
            written
        );
        Ok(written)
    }

    /// Grant public read access to an object.
    pub async fn make_public(&self, key: &str) -> StorageResult<()> {
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::AclFailed(DisplayErrorContext(&e).to_string()))?;

        debug!("Made {}/{} publicly readable", self.bucket, key);
        Ok(())
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::AwsSdk(format!(
                    "Bucket {} connectivity check failed: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
