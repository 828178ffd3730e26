//! Axum HTTP server for push-triggered video processing.
//!
//! This crate provides:
//! - The processing pipeline behind `POST /process-video`
//! - Video status lookup
//! - Health, readiness and Prometheus endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod processor;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use processor::{ProcessError, ProcessedVideo, VideoProcessor};
pub use routes::create_router;
pub use state::AppState;
