//! Video job status records.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use tracing::info;

use vidproc_models::{VideoId, VideoJob, VideoJobUpdate, VideoStatus};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, ToFirestoreValue, Value};

/// Default collection holding one document per video id.
pub const DEFAULT_COLLECTION: &str = "videos";

/// Outcome of registering a new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The record was created by this call.
    Registered,
    /// A record with this id already exists, whatever its status.
    AlreadyExists,
}

/// Persistent store of [`VideoJob`] records.
#[async_trait]
pub trait VideoJobStore: Send + Sync {
    /// Fetch a job record.
    async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoJob>>;

    /// Atomically create the record unless one already exists.
    async fn register(&self, job: &VideoJob) -> FirestoreResult<Registration>;

    /// Merge the set fields of `update` into the record, creating it if absent.
    async fn set_status(&self, video_id: &VideoId, update: &VideoJobUpdate) -> FirestoreResult<()>;

    /// Verify the store is reachable.
    async fn check_connectivity(&self) -> FirestoreResult<()>;
}

/// Firestore-backed [`VideoJobStore`].
#[derive(Clone)]
pub struct VideoJobRepository {
    client: FirestoreClient,
    collection: String,
}

impl VideoJobRepository {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    /// Collection from `VIDEO_COLLECTION`, default `videos`.
    pub fn from_env(client: FirestoreClient) -> Self {
        let collection = std::env::var("VIDEO_COLLECTION")
            .ok()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        Self::new(client, collection)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VideoJobStore for VideoJobRepository {
    async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoJob>> {
        match self
            .client
            .get_document(&self.collection, video_id.as_str())
            .await?
        {
            Some(doc) => Ok(Some(document_to_video_job(&doc, video_id)?)),
            None => Ok(None),
        }
    }

    async fn register(&self, job: &VideoJob) -> FirestoreResult<Registration> {
        let result = self
            .client
            .create_document(&self.collection, job.id.as_str(), video_job_to_fields(job))
            .await;

        match result {
            Ok(_) => {
                counter!("video_jobs_registered_total").increment(1);
                info!("Registered video job {} for owner {}", job.id, job.owner_id);
                Ok(Registration::Registered)
            }
            Err(e) if e.is_already_exists() => {
                counter!("video_jobs_duplicate_total").increment(1);
                Ok(Registration::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    async fn set_status(&self, video_id: &VideoId, update: &VideoJobUpdate) -> FirestoreResult<()> {
        let (fields, mask) = update_to_fields(update);
        self.client
            .update_document(&self.collection, video_id.as_str(), fields, &mask)
            .await?;

        if let Some(status) = update.status {
            info!("Video job {} is now {}", video_id, status);
        }
        Ok(())
    }

    async fn check_connectivity(&self) -> FirestoreResult<()> {
        self.client.ping(&self.collection).await
    }
}

fn video_job_to_fields(job: &VideoJob) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), job.id.as_str().to_firestore_value());
    fields.insert("owner_id".to_string(), job.owner_id.to_firestore_value());
    fields.insert("status".to_string(), job.status.as_str().to_firestore_value());
    if let Some(filename) = &job.filename {
        fields.insert("filename".to_string(), filename.to_firestore_value());
    }
    let now = Utc::now();
    fields.insert(
        "created_at".to_string(),
        job.created_at.unwrap_or(now).to_firestore_value(),
    );
    fields.insert(
        "updated_at".to_string(),
        job.updated_at.unwrap_or(now).to_firestore_value(),
    );
    fields
}

fn update_to_fields(update: &VideoJobUpdate) -> (HashMap<String, Value>, Vec<&'static str>) {
    let mut fields = HashMap::new();
    let mut mask = Vec::new();

    if let Some(status) = update.status {
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
        mask.push("status");
    }
    if let Some(filename) = &update.filename {
        fields.insert("filename".to_string(), filename.to_firestore_value());
        mask.push("filename");
    }
    fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
    mask.push("updated_at");

    (fields, mask)
}

fn document_to_video_job(doc: &Document, video_id: &VideoId) -> FirestoreResult<VideoJob> {
    let status = match doc.get::<String>("status") {
        Some(s) => VideoStatus::parse(&s).ok_or_else(|| {
            FirestoreError::invalid_document(format!("video {}: unknown status {:?}", video_id, s))
        })?,
        None => VideoStatus::default(),
    };

    Ok(VideoJob {
        id: video_id.clone(),
        owner_id: doc.get("owner_id").unwrap_or_default(),
        status,
        filename: doc.get("filename"),
        created_at: doc.get("created_at"),
        updated_at: doc.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_update_mask() {
        let (fields, mask) = update_to_fields(&VideoJobUpdate::processed("processed-a-1.mp4"));

        assert_eq!(mask, vec!["status", "filename", "updated_at"]);
        assert_eq!(
            fields.get("status"),
            Some(&Value::StringValue("processed".to_string()))
        );
        assert_eq!(
            fields.get("filename"),
            Some(&Value::StringValue("processed-a-1.mp4".to_string()))
        );
        assert!(!fields.contains_key("owner_id"));
    }

    #[test]
    fn test_document_without_status_is_processing() {
        let doc = Document::new(HashMap::from([(
            "owner_id".to_string(),
            Value::StringValue("user42".to_string()),
        )]));
        let job = document_to_video_job(&doc, &VideoId::from_string("user42-1")).unwrap();

        assert_eq!(job.status, VideoStatus::Processing);
        assert_eq!(job.owner_id, "user42");
        assert!(job.filename.is_none());
    }

    #[test]
    fn test_document_with_unknown_status() {
        let doc = Document::new(HashMap::from([(
            "status".to_string(),
            Value::StringValue("archived".to_string()),
        )]));
        let err = document_to_video_job(&doc, &VideoId::from_string("a-1")).unwrap_err();
        assert!(matches!(err, FirestoreError::InvalidDocument(_)));
    }
}
