//! Video processing and status handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use vidproc_models::{PushEnvelope, VideoId, VideoJob};

use crate::error::{ApiError, ApiResult};
use crate::processor::ProcessedVideo;
use crate::state::AppState;

/// Successful processing response.
#[derive(Debug, Serialize)]
pub struct ProcessVideoResponse {
    pub message: String,
    pub video_id: String,
    pub output_filename: String,
}

impl From<ProcessedVideo> for ProcessVideoResponse {
    fn from(video: ProcessedVideo) -> Self {
        Self {
            message: "Processing finished successfully".to_string(),
            video_id: video.video_id.to_string(),
            output_filename: video.output_filename,
        }
    }
}

/// Handle an upload notification pushed by the subscription.
///
/// Responds only once processing has finished.
pub async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<PushEnvelope>, JsonRejection>,
) -> ApiResult<Json<ProcessVideoResponse>> {
    let Json(envelope) = payload?;
    let processed = state.processor.process(&envelope).await?;
    Ok(Json(processed.into()))
}

/// Fetch the status record of a video.
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<VideoJob>> {
    let video_id = VideoId::from_string(video_id);
    state
        .jobs
        .get(&video_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Video {} not found", video_id)))
}
