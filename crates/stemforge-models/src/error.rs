//! Error types for the separation bridge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeparationError {
    #[error("Python not found. Install Python 3.8+ or run: stemforge setup-models")]
    PythonNotFound,

    #[error("Spleeter not installed. Run: stemforge setup-models")]
    SpleeterNotInstalled,

    #[error("Unknown separation model: {0}")]
    UnknownModel(String),

    #[error("Failed to build separation model: {0}")]
    ModelInit(String),

    #[error("Separation worker did not become ready within {0} seconds")]
    StartupTimeout(u64),

    #[error("Separation worker exited unexpectedly")]
    WorkerExited,

    #[error("Separation task aborted: {0}")]
    Aborted(String),

    #[error("Malformed worker message: {0}")]
    Protocol(String),

    #[error("Separation failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
