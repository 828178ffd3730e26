//! Push-triggered video processing.
//!
//! One call handles one upload notification:
//! decode → register → download → transcode → upload → record → clean up.
//! Every step after registration is followed by removal of both local files,
//! whatever the outcome. A failed run leaves the job record at `processing`.

use std::sync::Arc;
use std::time::Instant;

use scopeguard::ScopeGuard;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use vidproc_firestore::{FirestoreError, Registration, VideoJobStore};
use vidproc_media::{MediaError, Transcoder};
use vidproc_models::{
    IdentityError, NotificationError, PushEnvelope, VideoId, VideoIdentity, VideoJob,
    VideoJobUpdate,
};
use vidproc_storage::{LocalWorkspace, StorageError, VideoStorage};

use crate::metrics;

/// Why a notification was not processed.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("missing filename: {0}")]
    Notification(#[from] NotificationError),

    #[error("invalid filename: {0}")]
    Identity(#[from] IdentityError),

    #[error("video {0} is already processing or processed")]
    Duplicate(VideoId),

    #[error("status store error: {0}")]
    Store(#[from] FirestoreError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transcoding failed: {0}")]
    Transcode(#[from] MediaError),
}

impl ProcessError {
    /// The request itself was at fault; nothing was touched.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ProcessError::Notification(_) | ProcessError::Identity(_) | ProcessError::Duplicate(_)
        )
    }

    /// Outcome label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            ProcessError::Notification(_) | ProcessError::Identity(_) => "malformed",
            ProcessError::Duplicate(_) => "duplicate",
            ProcessError::Store(_) => "store_error",
            ProcessError::Storage(_) => "storage_error",
            ProcessError::Transcode(_) => "transcode_error",
        }
    }
}

/// A successfully processed and published video.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedVideo {
    pub video_id: VideoId,
    pub owner_id: String,
    pub output_filename: String,
}

/// Runs the processing pipeline against its three collaborators.
pub struct VideoProcessor {
    storage: Arc<dyn VideoStorage>,
    transcoder: Arc<dyn Transcoder>,
    jobs: Arc<dyn VideoJobStore>,
    workspace: LocalWorkspace,
}

impl VideoProcessor {
    pub fn new(
        storage: Arc<dyn VideoStorage>,
        transcoder: Arc<dyn Transcoder>,
        jobs: Arc<dyn VideoJobStore>,
        workspace: LocalWorkspace,
    ) -> Self {
        Self {
            storage,
            transcoder,
            jobs,
            workspace,
        }
    }

    pub fn workspace(&self) -> &LocalWorkspace {
        &self.workspace
    }

    /// Process the upload described by a push envelope.
    pub async fn process(&self, envelope: &PushEnvelope) -> Result<ProcessedVideo, ProcessError> {
        let result = match envelope.decode_payload() {
            Ok(notification) => self.process_filename(&notification.name).await,
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(_) => metrics::record_processing_outcome("processed"),
            Err(e) => metrics::record_processing_outcome(e.outcome()),
        }
        result
    }

    /// Process a raw upload by its object name.
    pub async fn process_filename(&self, filename: &str) -> Result<ProcessedVideo, ProcessError> {
        let identity = VideoIdentity::from_filename(filename)?;
        let span = info_span!(
            "process_video",
            video_id = %identity.video_id,
            owner_id = %identity.owner_id
        );

        self.run(identity).instrument(span).await
    }

    async fn run(&self, identity: VideoIdentity) -> Result<ProcessedVideo, ProcessError> {
        match self.jobs.register(&VideoJob::processing(&identity)).await? {
            Registration::Registered => {}
            Registration::AlreadyExists => {
                warn!("Video is already processing or processed, skipping");
                return Err(ProcessError::Duplicate(identity.video_id));
            }
        }

        // Dropped only if the request is cancelled mid-run.
        let pending = scopeguard::guard(
            (
                self.workspace.clone(),
                identity.input_filename.clone(),
                identity.output_filename.clone(),
            ),
            |(workspace, raw, processed)| {
                warn!("Processing of {} was cancelled, removing local files", raw);
                tokio::spawn(async move {
                    workspace.cleanup(&raw, &processed).await;
                });
            },
        );

        let result = self.transcode_and_publish(&identity).await;

        let (workspace, raw, processed) = ScopeGuard::into_inner(pending);
        workspace.cleanup(&raw, &processed).await;

        match result {
            Ok(()) => {
                info!("Processing finished for {}", identity.input_filename);
                Ok(ProcessedVideo {
                    video_id: identity.video_id,
                    owner_id: identity.owner_id,
                    output_filename: identity.output_filename,
                })
            }
            Err(e) => {
                error!("Processing failed for {}: {}", identity.input_filename, e);
                if let ProcessError::Transcode(media) = &e {
                    if let Some(stderr) = media.stderr() {
                        error!("ffmpeg output:\n{}", stderr);
                    }
                }
                Err(e)
            }
        }
    }

    async fn transcode_and_publish(&self, identity: &VideoIdentity) -> Result<(), ProcessError> {
        let start = Instant::now();
        let raw_path = self
            .storage
            .download_raw_video(&identity.input_filename)
            .await?;
        metrics::record_stage_duration("download", start.elapsed().as_secs_f64());

        let start = Instant::now();
        let output_path = self.workspace.processed_path(&identity.output_filename);
        self.transcoder.convert(&raw_path, &output_path).await?;
        metrics::record_stage_duration("transcode", start.elapsed().as_secs_f64());

        let start = Instant::now();
        self.storage
            .upload_processed_video(&identity.output_filename)
            .await?;
        metrics::record_stage_duration("upload", start.elapsed().as_secs_f64());

        self.jobs
            .set_status(
                &identity.video_id,
                &VideoJobUpdate::processed(&identity.output_filename),
            )
            .await?;
        Ok(())
    }
}
