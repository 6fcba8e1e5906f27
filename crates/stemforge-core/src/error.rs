//! Error types for stemforge-core

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StemforgeError>;

#[derive(Error, Debug)]
pub enum StemforgeError {
    #[error("Invalid upload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Separation model unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("Transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Separation failed: {0}")]
    Separation(#[from] stemforge_models::SeparationError),

    #[error("Enhancement failed: {0}")]
    Enhance(#[from] EnhanceError),

    #[error("Declared output '{name}' was not produced: {}", path.display())]
    MissingOutput { name: String, path: PathBuf },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ServiceUnavailable,
    Processing,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Processing => "processing",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StemforgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StemforgeError::Validation(_) => ErrorKind::Validation,
            StemforgeError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            StemforgeError::NotFound(_) => ErrorKind::NotFound,
            StemforgeError::Transcode(_)
            | StemforgeError::Separation(_)
            | StemforgeError::Enhance(_)
            | StemforgeError::MissingOutput { .. }
            | StemforgeError::Config(_)
            | StemforgeError::Io(_) => ErrorKind::Processing,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No file was sent in field '{0}'")]
    MissingField(String),

    #[error("No file was selected")]
    EmptyFilename,

    #[error("File type not allowed: {0}")]
    DisallowedExtension(String),

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Upload exceeds the {limit_mb} MiB limit")]
    TooLarge { limit_mb: usize },

    #[error("Malformed upload: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("FFmpeg not found. Install ffmpeg or set paths.ffmpeg")]
    FfmpegNotFound,

    #[error("FFmpeg failed with exit code {code:?}: {stderr}")]
    FfmpegFailed { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("Failed to read WAV: {0}")]
    Decode(String),

    #[error("Failed to write WAV: {0}")]
    Encode(String),

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("Spectral processing failed: {0}")]
    Fft(String),

    #[error("Worker task failed: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
