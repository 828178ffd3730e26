//! Video job repository against a mocked Firestore emulator.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidproc_firestore::{
    FirestoreClient, FirestoreConfig, FirestoreError, Registration, VideoJobRepository,
    VideoJobStore,
};
use vidproc_models::{VideoId, VideoIdentity, VideoJob, VideoJobUpdate, VideoStatus};

const COLLECTION_PATH: &str = "/v1/projects/test-project/databases/(default)/documents/videos";

async fn repository(server: &MockServer) -> VideoJobRepository {
    let config = FirestoreConfig::new("test-project").with_emulator(server.uri());
    let client = FirestoreClient::new(config).await.unwrap();
    VideoJobRepository::new(client, "videos")
}

fn job() -> VideoJob {
    let identity = VideoIdentity::from_filename("user42-1700000000000.mp4").unwrap();
    VideoJob::processing(&identity)
}

fn stored_document(status: &str, filename: Option<&str>) -> serde_json::Value {
    let mut fields = json!({
        "id": { "stringValue": "user42-1700000000000" },
        "owner_id": { "stringValue": "user42" },
        "status": { "stringValue": status },
        "created_at": { "timestampValue": "2024-01-02T03:04:05Z" },
        "updated_at": { "timestampValue": "2024-01-02T03:05:00Z" }
    });
    if let Some(filename) = filename {
        fields["filename"] = json!({ "stringValue": filename });
    }
    json!({
        "name": "projects/test-project/databases/(default)/documents/videos/user42-1700000000000",
        "fields": fields
    })
}

#[tokio::test]
async fn test_register_creates_processing_record() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .and(query_param("documentId", "user42-1700000000000"))
        .and(header("authorization", "Bearer owner"))
        .and(body_partial_json(json!({
            "fields": {
                "owner_id": { "stringValue": "user42" },
                "status": { "stringValue": "processing" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_document("processing", None)))
        .expect(1)
        .mount(&server)
        .await;

    let repo = repository(&server).await;
    assert_eq!(repo.register(&job()).await.unwrap(), Registration::Registered);
}

#[tokio::test]
async fn test_register_existing_record_is_duplicate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": { "code": 409, "status": "ALREADY_EXISTS", "message": "Document already exists" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repo = repository(&server).await;
    assert_eq!(
        repo.register(&job()).await.unwrap(),
        Registration::AlreadyExists
    );
}

#[tokio::test]
async fn test_register_store_failure_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let repo = repository(&server).await;
    let err = repo.register(&job()).await.unwrap_err();
    assert!(matches!(err, FirestoreError::ServerError(503, _)), "got {err:?}");
}

#[tokio::test]
async fn test_set_status_merges_masked_fields() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(format!("{COLLECTION_PATH}/user42-1700000000000")))
        .and(query_param("updateMask.fieldPaths", "status"))
        .and(query_param("updateMask.fieldPaths", "filename"))
        .and(query_param("updateMask.fieldPaths", "updated_at"))
        .and(body_partial_json(json!({
            "fields": {
                "status": { "stringValue": "processed" },
                "filename": { "stringValue": "processed-user42-1700000000000.mp4" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_document(
            "processed",
            Some("processed-user42-1700000000000.mp4"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let repo = repository(&server).await;
    repo.set_status(
        &VideoId::from_string("user42-1700000000000"),
        &VideoJobUpdate::processed("processed-user42-1700000000000.mp4"),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_get_maps_document_to_job() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{COLLECTION_PATH}/user42-1700000000000")))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_document(
            "processed",
            Some("processed-user42-1700000000000.mp4"),
        )))
        .mount(&server)
        .await;

    let repo = repository(&server).await;
    let job = repo
        .get(&VideoId::from_string("user42-1700000000000"))
        .await
        .unwrap()
        .expect("record should exist");

    assert_eq!(job.id.as_str(), "user42-1700000000000");
    assert_eq!(job.owner_id, "user42");
    assert_eq!(job.status, VideoStatus::Processed);
    assert_eq!(
        job.filename.as_deref(),
        Some("processed-user42-1700000000000.mp4")
    );
    assert!(job.created_at.is_some());
}

#[tokio::test]
async fn test_get_missing_document() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{COLLECTION_PATH}/nobody-1")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let repo = repository(&server).await;
    assert!(repo
        .get(&VideoId::from_string("nobody-1"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_check_connectivity() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTION_PATH))
        .and(query_param("pageSize", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let repo = repository(&server).await;
    repo.check_connectivity().await.unwrap();
}

#[tokio::test]
async fn test_permission_denied() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(COLLECTION_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&server)
        .await;

    let repo = repository(&server).await;
    let err = repo.check_connectivity().await.unwrap_err();
    assert!(matches!(err, FirestoreError::PermissionDenied(_)));
}
