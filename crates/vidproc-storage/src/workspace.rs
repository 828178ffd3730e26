//! Local scratch directories for raw and processed videos.
//!
//! Files are keyed by filename and owned by the request that created them;
//! every request deletes both of its files when it finishes.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Default directory for downloaded raw videos.
pub const DEFAULT_RAW_DIR: &str = "./raw-videos";

/// Default directory for transcoded videos.
pub const DEFAULT_PROCESSED_DIR: &str = "./processed-videos";

/// The pair of local working directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalWorkspace {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl Default for LocalWorkspace {
    fn default() -> Self {
        Self::new(DEFAULT_RAW_DIR, DEFAULT_PROCESSED_DIR)
    }
}

impl LocalWorkspace {
    pub fn new(raw_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    /// Create from `RAW_VIDEO_DIR` / `PROCESSED_VIDEO_DIR`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("RAW_VIDEO_DIR").unwrap_or_else(|_| DEFAULT_RAW_DIR.to_string()),
            std::env::var("PROCESSED_VIDEO_DIR")
                .unwrap_or_else(|_| DEFAULT_PROCESSED_DIR.to_string()),
        )
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Local path of a raw video.
    pub fn raw_path(&self, filename: &str) -> PathBuf {
        self.raw_dir.join(filename)
    }

    /// Local path of a processed video.
    pub fn processed_path(&self, filename: &str) -> PathBuf {
        self.processed_dir.join(filename)
    }

    /// Create both directories if they do not exist yet.
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        for dir in [&self.raw_dir, &self.processed_dir] {
            if tokio::fs::try_exists(dir).await.unwrap_or(false) {
                continue;
            }
            tokio::fs::create_dir_all(dir).await?;
            info!("Directory created at {}", dir.display());
        }
        Ok(())
    }

    /// Delete a raw video; missing files are not an error.
    pub async fn delete_raw(&self, filename: &str) -> StorageResult<()> {
        delete_file(&self.raw_path(filename)).await
    }

    /// Delete a processed video; missing files are not an error.
    pub async fn delete_processed(&self, filename: &str) -> StorageResult<()> {
        delete_file(&self.processed_path(filename)).await
    }

    /// Delete both local copies concurrently.
    ///
    /// Failures are logged and swallowed.
    pub async fn cleanup(&self, raw_filename: &str, processed_filename: &str) {
        let (raw, processed) = tokio::join!(
            self.delete_raw(raw_filename),
            self.delete_processed(processed_filename)
        );

        if let Err(e) = raw {
            warn!("Failed to clean up raw video {}: {}", raw_filename, e);
        }
        if let Err(e) = processed {
            warn!(
                "Failed to clean up processed video {}: {}",
                processed_filename, e
            );
        }
    }
}

/// Remove a file, treating "not found" as success.
pub async fn delete_file(path: &Path) -> StorageResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("File deleted at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("File not found at {}, skipping the delete", path.display());
            Ok(())
        }
        Err(e) => Err(StorageError::delete_failed(format!(
            "{}: {}",
            path.display(),
            e
        ))),
    }
}
