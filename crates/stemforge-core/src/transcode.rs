//! Audio transcoding using FFmpeg

use crate::error::TranscodeError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Transcoder {
    ffmpeg_path: PathBuf,
}

impl Transcoder {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    /// Convert any input FFmpeg understands to 16-bit PCM WAV.
    ///
    /// Sample rate and channel layout are kept as in the source. An existing
    /// output is overwritten.
    pub async fn to_wav(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        info!("Transcoding {} to WAV", input.display());

        let result = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .arg("-i")
            .arg(input)
            // Drop cover art and other video streams
            .arg("-vn")
            .args(["-c:a", "pcm_s16le"])
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TranscodeError::FfmpegNotFound,
                _ => TranscodeError::Io(e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            debug!("ffmpeg stderr: {}", stderr);
            return Err(TranscodeError::FfmpegFailed {
                code: result.status.code(),
                stderr,
            });
        }

        debug!("Transcoded to: {}", output.display());
        Ok(())
    }
}
