//! 360p transcoding.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{error, info};

use vidproc_models::{scale_filter, TARGET_HEIGHT};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Rescales a local video file into another local file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode `input` into `output`, resolving once the tool has finished.
    async fn convert(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

/// FFmpeg-backed transcoder producing a fixed output height.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    target_height: u32,
    timeout: Option<Duration>,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            target_height: TARGET_HEIGHT,
            timeout: None,
        }
    }
}

impl FfmpegTranscoder {
    /// Transcoder for 360p output, bounded by `timeout` when set.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn target_height(&self) -> u32 {
        self.target_height
    }

    /// Build the FFmpeg invocation for one conversion.
    pub fn command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .video_filter(scale_filter(self.target_height))
            .log_level("error")
    }

    fn runner(&self) -> FfmpegRunner {
        match self.timeout {
            Some(timeout) => FfmpegRunner::new().with_timeout(timeout),
            None => FfmpegRunner::new(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, input: &Path, output: &Path) -> MediaResult<()> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        let cmd = self.command(input, output);
        let start = Instant::now();

        match self.runner().run(&cmd).await {
            Ok(()) => {
                info!(
                    "Transcoded {} to {} ({}p) in {:.1}s",
                    input.display(),
                    output.display(),
                    self.target_height,
                    start.elapsed().as_secs_f64()
                );
                Ok(())
            }
            Err(e) => {
                error!("Transcoding {} failed: {}", input.display(), e);
                Err(e)
            }
        }
    }
}
