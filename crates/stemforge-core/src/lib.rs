//! stemforge-core: upload intake, transcoding, separation and noise reduction
//! behind one [`AudioService`]

pub mod artifacts;
pub mod config;
pub mod enhance;
pub mod error;
pub mod intake;
pub mod janitor;
pub mod service;
pub mod transcode;

pub use artifacts::{FilesResponse, JobOutput, OutputArtifact};
pub use config::Config;
pub use error::{ErrorKind, Result, StemforgeError};
pub use intake::{AudioExtension, FileIntake, UploadedFile};
pub use service::AudioService;
