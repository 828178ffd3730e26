//! API error types.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::processor::ProcessError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Video processing failed: {0}")]
    Processing(ProcessError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] vidproc_firestore::FirestoreError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Processing(_) | ApiError::Firestore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProcessError> for ApiError {
    fn from(e: ProcessError) -> Self {
        if e.is_client_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Processing(e)
        }
    }
}

/// A body that is not a push envelope counts as a missing filename.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("missing filename: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Detail shown for a server error once internals are hidden.
#[derive(Debug, Clone, Copy)]
struct PublicDetail(&'static str);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let public = match self {
            ApiError::Processing(_) => Some(PublicDetail("Video processing failed")),
            ApiError::Firestore(_) => Some(PublicDetail("An internal error occurred")),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response();
        if let Some(public) = public {
            response.extensions_mut().insert(public);
        }
        response
    }
}

/// Don't expose internal error details in production.
pub async fn hide_error_details(
    State(config): State<ApiConfig>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !config.is_production() {
        return response;
    }

    match response.extensions().get::<PublicDetail>().copied() {
        Some(PublicDetail(detail)) => (
            response.status(),
            Json(ErrorResponse {
                detail: detail.to_string(),
            }),
        )
            .into_response(),
        None => response,
    }
}
