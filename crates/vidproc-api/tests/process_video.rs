//! End-to-end router tests against in-memory collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value as JsonValue};
use tempfile::TempDir;
use tower::ServiceExt;

use vidproc_api::{create_router, ApiConfig, AppState, VideoProcessor};
use vidproc_firestore::{FirestoreError, FirestoreResult, Registration, VideoJobStore};
use vidproc_media::{MediaError, MediaResult, Transcoder};
use vidproc_models::{
    PushEnvelope, StorageNotification, VideoId, VideoJob, VideoJobUpdate, VideoStatus,
};
use vidproc_storage::{LocalWorkspace, StorageError, StorageResult, VideoStorage};

const FILENAME: &str = "user42-1700000000000.mp4";
const OUTPUT: &str = "processed-user42-1700000000000.mp4";

// ============================================================================
// Fakes
// ============================================================================

struct FakeStorage {
    workspace: LocalWorkspace,
    fail_download: bool,
    fail_upload: bool,
    downloads: AtomicUsize,
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl VideoStorage for FakeStorage {
    async fn download_raw_video(&self, filename: &str) -> StorageResult<PathBuf> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_download {
            return Err(StorageError::not_found(filename));
        }
        let path = self.workspace.raw_path(filename);
        tokio::fs::write(&path, b"raw video").await?;
        Ok(path)
    }

    async fn upload_processed_video(&self, filename: &str) -> StorageResult<()> {
        let path = self.workspace.processed_path(filename);
        if !path.exists() {
            return Err(StorageError::upload_failed(format!("{} missing", filename)));
        }
        if self.fail_upload {
            return Err(StorageError::upload_failed("access denied"));
        }
        self.uploads.lock().unwrap().push(filename.to_string());
        Ok(())
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

struct FakeTranscoder {
    fail: bool,
    stall: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn convert(&self, input: &Path, output: &Path) -> MediaResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.exists(), "raw file should be downloaded first");
        // A failing ffmpeg can still leave a partial output behind.
        tokio::fs::write(output, b"360p video").await?;
        if self.stall {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.fail {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with a failure status",
                Some("input.mp4: Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
struct InMemoryJobs {
    records: Mutex<HashMap<String, VideoJob>>,
    fail_register: bool,
    fail_set_status: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl VideoJobStore for InMemoryJobs {
    async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoJob>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.lock().unwrap().get(video_id.as_str()).cloned())
    }

    async fn register(&self, job: &VideoJob) -> FirestoreResult<Registration> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_register {
            return Err(FirestoreError::ServerError(503, "unavailable".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        if records.contains_key(job.id.as_str()) {
            return Ok(Registration::AlreadyExists);
        }
        records.insert(job.id.as_str().to_string(), job.clone());
        Ok(Registration::Registered)
    }

    async fn set_status(&self, video_id: &VideoId, update: &VideoJobUpdate) -> FirestoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_set_status {
            return Err(FirestoreError::ServerError(503, "unavailable".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(video_id.as_str().to_string())
            .or_insert_with(|| VideoJob {
                id: video_id.clone(),
                owner_id: String::new(),
                status: VideoStatus::Processing,
                filename: None,
                created_at: None,
                updated_at: None,
            });
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(filename) = &update.filename {
            record.filename = Some(filename.clone());
        }
        Ok(())
    }

    async fn check_connectivity(&self) -> FirestoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    _dir: TempDir,
    workspace: LocalWorkspace,
    storage: Arc<FakeStorage>,
    transcoder: Arc<FakeTranscoder>,
    jobs: Arc<InMemoryJobs>,
    processor: Arc<VideoProcessor>,
    app: Router,
}

#[derive(Default)]
struct Options {
    fail_download: bool,
    fail_upload: bool,
    fail_transcode: bool,
    stall_transcode: bool,
    fail_register: bool,
    fail_set_status: bool,
    production: bool,
}

async fn harness(options: Options) -> Harness {
    let dir = TempDir::new().unwrap();
    let workspace = LocalWorkspace::new(dir.path().join("raw"), dir.path().join("processed"));
    workspace.ensure_dirs().await.unwrap();

    let storage = Arc::new(FakeStorage {
        workspace: workspace.clone(),
        fail_download: options.fail_download,
        fail_upload: options.fail_upload,
        downloads: AtomicUsize::new(0),
        uploads: Mutex::new(Vec::new()),
    });
    let transcoder = Arc::new(FakeTranscoder {
        fail: options.fail_transcode,
        stall: options.stall_transcode,
        calls: AtomicUsize::new(0),
    });
    let jobs = Arc::new(InMemoryJobs {
        fail_register: options.fail_register,
        fail_set_status: options.fail_set_status,
        ..Default::default()
    });

    let config = ApiConfig {
        environment: if options.production {
            "production"
        } else {
            "development"
        }
        .to_string(),
        ..Default::default()
    };
    let state = AppState::new(
        config,
        storage.clone(),
        transcoder.clone(),
        jobs.clone(),
        workspace.clone(),
    );
    let processor = Arc::clone(&state.processor);

    Harness {
        _dir: dir,
        workspace,
        storage,
        transcoder,
        jobs,
        processor,
        app: create_router(state, None),
    }
}

impl Harness {
    async fn post(&self, body: Vec<u8>) -> (StatusCode, JsonValue) {
        let request = Request::builder()
            .method("POST")
            .uri("/process-video")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        send(&self.app, request).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, JsonValue) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(&self.app, request).await
    }

    fn local_files_removed(&self) -> bool {
        !self.workspace.raw_path(FILENAME).exists()
            && !self.workspace.processed_path(OUTPUT).exists()
    }

    fn record(&self, video_id: &str) -> Option<VideoJob> {
        self.jobs.records.lock().unwrap().get(video_id).cloned()
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, JsonValue) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

fn envelope(name: &str) -> Vec<u8> {
    let envelope = PushEnvelope::wrap(&StorageNotification {
        name: name.to_string(),
        bucket: Some("raw-videos".to_string()),
        content_type: Some("video/mp4".to_string()),
        size: None,
    })
    .unwrap();
    serde_json::to_vec(&envelope).unwrap()
}

fn envelope_with_data(data: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({ "message": { "data": data } })).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_success_publishes_and_records_processed() {
    let h = harness(Options::default()).await;

    let (status, body) = h.post(envelope(FILENAME)).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["video_id"], "user42-1700000000000");
    assert_eq!(body["output_filename"], OUTPUT);
    assert_eq!(*h.storage.uploads.lock().unwrap(), vec![OUTPUT.to_string()]);

    let record = h.record("user42-1700000000000").unwrap();
    assert_eq!(record.status, VideoStatus::Processed);
    assert_eq!(record.owner_id, "user42");
    assert_eq!(record.filename.as_deref(), Some(OUTPUT));

    assert!(h.local_files_removed());
}

#[tokio::test]
async fn test_second_request_for_same_id_is_rejected() {
    let h = harness(Options::default()).await;

    let (status, _) = h.post(envelope(FILENAME)).await;
    assert_eq!(status, StatusCode::OK);

    // Same id, different extension: still a duplicate.
    let (status, body) = h.post(envelope("user42-1700000000000.mov")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("already processing or processed"));

    assert_eq!(h.storage.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_in_flight_record_blocks_processing() {
    let h = harness(Options::default()).await;
    h.jobs.records.lock().unwrap().insert(
        "user42-1700000000000".to_string(),
        VideoJob {
            id: VideoId::from_string("user42-1700000000000"),
            owner_id: "user42".to_string(),
            status: VideoStatus::Processing,
            filename: None,
            created_at: None,
            updated_at: None,
        },
    );

    let (status, _) = h.post(envelope(FILENAME)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.storage.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transcode_failure_cleans_up_and_leaves_processing() {
    let h = harness(Options {
        fail_transcode: true,
        ..Default::default()
    })
    .await;

    let (status, body) = h.post(envelope(FILENAME)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("processing failed"));
    assert!(h.local_files_removed());
    assert!(h.storage.uploads.lock().unwrap().is_empty());
    assert_eq!(
        h.record("user42-1700000000000").unwrap().status,
        VideoStatus::Processing
    );
}

#[tokio::test]
async fn test_download_failure_is_server_error() {
    let h = harness(Options {
        fail_download: true,
        ..Default::default()
    })
    .await;

    let (status, _) = h.post(envelope(FILENAME)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
    assert!(h.local_files_removed());
}

#[tokio::test]
async fn test_upload_failure_cleans_up_and_leaves_processing() {
    let h = harness(Options {
        fail_upload: true,
        ..Default::default()
    })
    .await;

    let (status, _) = h.post(envelope(FILENAME)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 1);
    assert!(h.storage.uploads.lock().unwrap().is_empty());
    assert!(h.local_files_removed());
    assert_eq!(
        h.record("user42-1700000000000").unwrap().status,
        VideoStatus::Processing
    );
}

#[tokio::test]
async fn test_status_update_failure_after_upload_is_server_error() {
    let h = harness(Options {
        fail_set_status: true,
        ..Default::default()
    })
    .await;

    let (status, _) = h.post(envelope(FILENAME)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(*h.storage.uploads.lock().unwrap(), vec![OUTPUT.to_string()]);
    assert!(h.local_files_removed());
    let record = h.record("user42-1700000000000").unwrap();
    assert_eq!(record.status, VideoStatus::Processing);
    assert!(record.filename.is_none());
}

#[tokio::test]
async fn test_cancelled_processing_removes_local_files() {
    let h = harness(Options {
        stall_transcode: true,
        ..Default::default()
    })
    .await;

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        h.processor.process_filename(FILENAME),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 1);

    // Removal runs on a spawned task once the request future is dropped.
    for _ in 0..100 {
        if h.local_files_removed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.local_files_removed());
    assert_eq!(
        h.record("user42-1700000000000").unwrap().status,
        VideoStatus::Processing
    );
}

#[tokio::test]
async fn test_production_hides_failure_details() {
    let h = harness(Options {
        fail_transcode: true,
        production: true,
        ..Default::default()
    })
    .await;

    let (status, body) = h.post(envelope(FILENAME)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Video processing failed");

    let (status, body) = h.post(envelope(FILENAME)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("already processing or processed"));
}

#[tokio::test]
async fn test_store_failure_touches_no_storage() {
    let h = harness(Options {
        fail_register: true,
        ..Default::default()
    })
    .await;

    let (status, _) = h.post(envelope(FILENAME)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.storage.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_payloads_are_bad_requests() {
    let h = harness(Options::default()).await;

    let bodies = vec![
        envelope_with_data("not base64 at all!"),
        envelope_with_data(&STANDARD.encode("not json")),
        envelope_with_data(&STANDARD.encode(r#"{"bucket":"raw-videos"}"#)),
        envelope_with_data(&STANDARD.encode(r#"{"name":""}"#)),
        envelope("../etc/passwd"),
        serde_json::to_vec(&json!({ "hello": "world" })).unwrap(),
        b"{".to_vec(),
    ];

    for body in bodies {
        let (status, json) = h.post(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].is_string());
    }

    assert_eq!(h.jobs.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.storage.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_get_video_status() {
    let h = harness(Options::default()).await;

    let (status, _) = h.get("/videos/user42-1700000000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.post(envelope(FILENAME)).await;

    let (status, body) = h.get("/videos/user42-1700000000000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "user42-1700000000000");
    assert_eq!(body["owner_id"], "user42");
    assert_eq!(body["status"], "processed");
    assert_eq!(body["filename"], OUTPUT);
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = harness(Options::default()).await;

    for uri in ["/health", "/healthz"] {
        let (status, body) = h.get(uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
