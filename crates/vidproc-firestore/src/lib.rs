//! Firestore REST API client and video job status store.
//!
//! This crate provides:
//! - A Firestore REST client with service account or emulator authentication
//! - The [`VideoJobStore`] trait and its Firestore repository
//! - Atomic job registration through create-with-document-id

pub mod client;
pub mod error;
pub mod metrics;
pub mod token_cache;
pub mod types;
pub mod video_jobs;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
pub use video_jobs::{Registration, VideoJobRepository, VideoJobStore, DEFAULT_COLLECTION};
