//! Video job models and filename-derived identity.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::encoding::PROCESSED_PREFIX;

/// Separator between the video id and the file extension.
const EXTENSION_SEPARATOR: char = '.';

/// Separator between the owner id and the upload timestamp.
const OWNER_SEPARATOR: char = '-';

/// Identifier of a video, derived from the uploaded filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Video processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Registered and being transcoded
    #[default]
    Processing,
    /// Transcoded and published
    Processed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Processing => "processing",
            VideoStatus::Processed => "processed",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(VideoStatus::Processing),
            "processed" => Some(VideoStatus::Processed),
            _ => None,
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle record for one video, stored in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    /// Video id (filename without extension)
    pub id: VideoId,

    /// Owner id (video id prefix before the first `-`)
    pub owner_id: String,

    /// Processing status
    #[serde(default)]
    pub status: VideoStatus,

    /// Output filename, set once processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last update timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl VideoJob {
    /// New record in the `processing` state.
    pub fn processing(identity: &VideoIdentity) -> Self {
        let now = Utc::now();
        Self {
            id: identity.video_id.clone(),
            owner_id: identity.owner_id.clone(),
            status: VideoStatus::Processing,
            filename: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Partial update merged into an existing [`VideoJob`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoJobUpdate {
    pub status: Option<VideoStatus>,
    pub filename: Option<String>,
}

impl VideoJobUpdate {
    /// Update written after the processed file has been published.
    pub fn processed(filename: impl Into<String>) -> Self {
        Self {
            status: Some(VideoStatus::Processed),
            filename: Some(filename.into()),
        }
    }
}

/// Errors raised when an uploaded filename cannot be mapped to a video.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("filename is empty")]
    EmptyFilename,

    #[error("filename {0:?} has no video id before its extension")]
    EmptyVideoId(String),

    #[error("filename {0:?} must not contain path components")]
    PathComponent(String),

    #[error("filename {0:?} contains a NUL byte")]
    NulByte(String),

    #[error("video id {0:?} is reserved")]
    ReservedVideoId(String),
}

/// Identity derived from a raw upload's filename.
///
/// Uploads are named `<owner>-<timestamp>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoIdentity {
    /// Raw filename as uploaded
    pub input_filename: String,
    /// Filename of the transcoded output
    pub output_filename: String,
    pub video_id: VideoId,
    pub owner_id: String,
}

impl VideoIdentity {
    /// Derive the video id, owner id and output name from a raw filename.
    pub fn from_filename(filename: &str) -> Result<Self, IdentityError> {
        if filename.is_empty() {
            return Err(IdentityError::EmptyFilename);
        }

        // The filename is used as a local path below the scratch directories.
        if filename.contains('/') || filename.contains('\\') {
            return Err(IdentityError::PathComponent(filename.to_string()));
        }
        if filename.contains('\0') {
            return Err(IdentityError::NulByte(filename.to_string()));
        }

        let video_id = filename
            .split_once(EXTENSION_SEPARATOR)
            .map_or(filename, |(id, _)| id);
        if video_id.is_empty() {
            return Err(IdentityError::EmptyVideoId(filename.to_string()));
        }
        // Document ids of the form `__name__` are reserved by the status store.
        if video_id.len() >= 4 && video_id.starts_with("__") && video_id.ends_with("__") {
            return Err(IdentityError::ReservedVideoId(video_id.to_string()));
        }

        let owner_id = video_id
            .split_once(OWNER_SEPARATOR)
            .map_or(video_id, |(owner, _)| owner);

        Ok(Self {
            input_filename: filename.to_string(),
            output_filename: format!("{}{}", PROCESSED_PREFIX, filename),
            video_id: VideoId::from_string(video_id),
            owner_id: owner_id.to_string(),
        })
    }
}
