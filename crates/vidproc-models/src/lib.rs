//! Shared data models for the video processing service.
//!
//! This crate provides Serde-serializable types for:
//! - Video jobs and their status
//! - Filename-derived video identity
//! - Push notification envelopes
//! - Output encoding constants

pub mod encoding;
pub mod notification;
pub mod video;

// Re-export common types
pub use encoding::{scale_filter, video_content_type, PROCESSED_PREFIX, TARGET_HEIGHT};
pub use notification::{
    decode_data, NotificationError, NotificationResult, PushEnvelope, PushMessage,
    StorageNotification,
};
pub use video::{IdentityError, VideoId, VideoIdentity, VideoJob, VideoJobUpdate, VideoStatus};
