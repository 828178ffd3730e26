//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vidproc_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vidproc_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vidproc_http_requests_in_flight";

    // Processing metrics
    pub const VIDEOS_PROCESSED_TOTAL: &str = "vidproc_videos_total";
    pub const STAGE_DURATION_SECONDS: &str = "vidproc_stage_duration_seconds";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record the outcome of one processing request.
pub fn record_processing_outcome(outcome: &'static str) {
    counter!(names::VIDEOS_PROCESSED_TOTAL, "outcome" => outcome).increment(1);
}

/// Record how long a pipeline stage (download, transcode, upload) took.
pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

/// Collapse per-video paths so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    match path.strip_prefix("/videos/") {
        Some(rest) if !rest.is_empty() => "/videos/:video_id".to_string(),
        _ => path.to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let in_flight = scopeguard::guard((), |_| {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    });
    let response = next.run(request).await;
    drop(in_flight);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use std::time::Duration;
    use tower::ServiceExt;

    fn gauge_value(rendered: &str, name: &str) -> Option<f64> {
        rendered
            .lines()
            .filter(|line| !line.starts_with('#'))
            .find_map(|line| {
                let (metric, value) = line.split_once(' ')?;
                (metric == name).then(|| value.trim().parse().ok())?
            })
    }

    #[tokio::test]
    async fn test_in_flight_gauge_released_when_request_is_dropped() {
        let handle = init_metrics().unwrap();
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "done"
                }),
            )
            .layer(axum::middleware::from_fn(metrics_middleware));

        let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let result = tokio::time::timeout(Duration::from_millis(50), app.oneshot(request)).await;
        assert!(result.is_err());

        let rendered = handle.render();
        assert_eq!(
            gauge_value(&rendered, names::HTTP_REQUESTS_IN_FLIGHT),
            Some(0.0),
            "{rendered}"
        );
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/videos/user42-1700000000000"),
            "/videos/:video_id"
        );
        assert_eq!(sanitize_path("/process-video"), "/process-video");
        assert_eq!(sanitize_path("/videos/"), "/videos/");
    }
}
