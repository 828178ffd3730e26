//! Raw and processed video transfers.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use vidproc_models::video_content_type;

use crate::client::{ObjectStorageClient, StorageConfig};
use crate::error::StorageResult;
use crate::workspace::LocalWorkspace;

/// Moves videos between the buckets and the local workspace.
#[async_trait]
pub trait VideoStorage: Send + Sync {
    /// Download a raw upload into the raw directory under the same name.
    async fn download_raw_video(&self, filename: &str) -> StorageResult<PathBuf>;

    /// Upload a file from the processed directory and make it publicly readable.
    async fn upload_processed_video(&self, filename: &str) -> StorageResult<()>;

    /// Verify both buckets are reachable.
    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Bucket-backed [`VideoStorage`].
#[derive(Clone)]
pub struct BucketStorage {
    raw: ObjectStorageClient,
    processed: ObjectStorageClient,
    workspace: LocalWorkspace,
}

impl BucketStorage {
    pub fn new(
        raw: ObjectStorageClient,
        processed: ObjectStorageClient,
        workspace: LocalWorkspace,
    ) -> Self {
        Self {
            raw,
            processed,
            workspace,
        }
    }

    /// Connect both buckets described by `config`.
    pub async fn connect(config: &StorageConfig, workspace: LocalWorkspace) -> StorageResult<Self> {
        let raw = ObjectStorageClient::connect(config, &config.raw_bucket).await?;
        let processed = raw.for_bucket(&config.processed_bucket);
        Ok(Self::new(raw, processed, workspace))
    }

    pub fn workspace(&self) -> &LocalWorkspace {
        &self.workspace
    }
}

#[async_trait]
impl VideoStorage for BucketStorage {
    async fn download_raw_video(&self, filename: &str) -> StorageResult<PathBuf> {
        let path = self.workspace.raw_path(filename);
        self.raw.download_file(filename, &path).await?;
        Ok(path)
    }

    async fn upload_processed_video(&self, filename: &str) -> StorageResult<()> {
        let path = self.workspace.processed_path(filename);
        self.processed
            .upload_file(&path, filename, video_content_type(filename))
            .await?;
        self.processed.make_public(filename).await?;

        info!("Published {}/{}", self.processed.bucket(), filename);
        Ok(())
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        self.raw.check_connectivity().await?;
        self.processed.check_connectivity().await
    }
}
