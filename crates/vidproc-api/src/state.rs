//! Application state.

use std::sync::Arc;

use anyhow::Context;

use vidproc_firestore::{FirestoreClient, VideoJobRepository, VideoJobStore};
use vidproc_media::{FfmpegTranscoder, Transcoder};
use vidproc_storage::{BucketStorage, LocalWorkspace, StorageConfig, VideoStorage};

use crate::config::ApiConfig;
use crate::processor::VideoProcessor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub processor: Arc<VideoProcessor>,
    pub storage: Arc<dyn VideoStorage>,
    pub jobs: Arc<dyn VideoJobStore>,
}

impl AppState {
    /// Assemble state from already-built collaborators.
    pub fn new(
        config: ApiConfig,
        storage: Arc<dyn VideoStorage>,
        transcoder: Arc<dyn Transcoder>,
        jobs: Arc<dyn VideoJobStore>,
        workspace: LocalWorkspace,
    ) -> Self {
        let processor = VideoProcessor::new(
            Arc::clone(&storage),
            transcoder,
            Arc::clone(&jobs),
            workspace,
        );
        Self {
            config,
            processor: Arc::new(processor),
            storage,
            jobs,
        }
    }

    /// Connect the buckets and Firestore described by the environment.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let workspace = LocalWorkspace::from_env();
        workspace
            .ensure_dirs()
            .await
            .context("Failed to create local video directories")?;

        let storage_config = StorageConfig::from_env().context("Invalid storage configuration")?;
        let storage = BucketStorage::connect(&storage_config, workspace.clone())
            .await
            .context("Failed to create storage client")?;

        let firestore = FirestoreClient::from_env()
            .await
            .context("Failed to create Firestore client")?;
        let jobs = VideoJobRepository::from_env(firestore);

        let transcoder = FfmpegTranscoder::new(config.transcode_timeout);

        Ok(Self::new(
            config,
            Arc::new(storage),
            Arc::new(transcoder),
            Arc::new(jobs),
            workspace,
        ))
    }
}
