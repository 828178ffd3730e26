//! Push notification envelope for object uploads.
//!
//! The subscription pushes a JSON envelope whose `message.data` is the
//! base64-encoded object notification. Only the object `name` is required.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding an inbound notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("message data is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("message data is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message payload has no object name")]
    MissingName,
}

pub type NotificationResult<T> = Result<T, NotificationError>;

/// Push subscription request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

/// The pushed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded JSON payload
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// Object-storage notification carried in the message data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageNotification {
    /// Uploaded object name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Payload shape before the `name` requirement is checked.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

impl PushEnvelope {
    /// Wrap a notification into an envelope, as the push subscription would.
    pub fn wrap(notification: &StorageNotification) -> NotificationResult<Self> {
        let json = serde_json::to_vec(notification)?;
        Ok(Self {
            message: PushMessage {
                data: STANDARD.encode(json),
                message_id: None,
                publish_time: None,
                attributes: HashMap::new(),
            },
            subscription: None,
        })
    }

    /// Decode `message.data` into the object notification.
    pub fn decode_payload(&self) -> NotificationResult<StorageNotification> {
        decode_data(&self.message.data)
    }
}

/// Decode base64 message data and require a non-empty `name`.
pub fn decode_data(data: &str) -> NotificationResult<StorageNotification> {
    let bytes = STANDARD.decode(data.trim())?;
    let raw: RawNotification = serde_json::from_slice(&bytes)?;

    let name = raw
        .name
        .filter(|n| !n.is_empty())
        .ok_or(NotificationError::MissingName)?;

    Ok(StorageNotification {
        name,
        bucket: raw.bucket,
        content_type: raw.content_type,
        size: raw.size,
    })
}
