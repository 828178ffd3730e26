//! Object storage for raw and processed videos.
//!
//! This crate provides:
//! - An S3-compatible client (GCS interoperability, R2, S3)
//! - Raw video download and processed video publication
//! - The local scratch workspace and its cleanup

pub mod client;
pub mod error;
pub mod videos;
pub mod workspace;

pub use client::{ObjectStorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use videos::{BucketStorage, VideoStorage};
pub use workspace::{delete_file, LocalWorkspace};
