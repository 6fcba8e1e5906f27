//! Job orchestration: separation and enhancement of stored uploads

use crate::artifacts::{verify_outputs, JobOutput, OutputArtifact};
use crate::config::Config;
use crate::enhance::{Enhancer, SpectralGateConfig};
use crate::error::{Result, StemforgeError, TranscodeError};
use crate::intake::{FileIntake, UploadedFile};
use crate::transcode::Transcoder;

use std::path::Path;
use std::time::Instant;
use stemforge_models::{SeparationError, SeparatorHandle, SpleeterModel, SpleeterWorker};
use tracing::{debug, error, info};

/// Logical name of the enhancement output
pub const ENHANCED: &str = "enhanced";

/// Shared by all requests for the lifetime of the server
#[derive(Debug)]
pub struct AudioService {
    config: Config,
    intake: FileIntake,
    separator: SeparatorHandle,
    enhancer: Enhancer,
}

impl AudioService {
    /// Create the storage directories and load the separation model.
    ///
    /// A model that fails to load does not fail startup; separation requests
    /// are refused for the life of the process instead.
    pub async fn start(config: Config) -> Result<Self> {
        Self::create_dirs(&config).await?;
        let separator = Self::start_separator(&config).await;
        Ok(Self::with_separator(config, separator))
    }

    /// Build the service around an already prepared separator
    pub fn with_separator(config: Config, separator: SeparatorHandle) -> Self {
        Self {
            intake: FileIntake::new(config.storage.upload_dir.clone()),
            enhancer: Enhancer::new(SpectralGateConfig::from(&config.enhance)),
            separator,
            config,
        }
    }

    async fn create_dirs(config: &Config) -> Result<()> {
        tokio::fs::create_dir_all(&config.storage.upload_dir).await?;
        tokio::fs::create_dir_all(&config.storage.processed_dir).await?;
        debug!(
            "Storage ready: uploads={}, processed={}",
            config.storage.upload_dir.display(),
            config.storage.processed_dir.display()
        );
        Ok(())
    }

    async fn start_separator(config: &Config) -> SeparatorHandle {
        if !config.separation.enabled {
            info!("Separation disabled by configuration");
            return SeparatorHandle::unavailable("separation is disabled in the configuration");
        }

        let Some(model) = SpleeterModel::from_str(&config.separation.model) else {
            return SeparatorHandle::from_startup::<SpleeterWorker>(Err(
                SeparationError::UnknownModel(config.separation.model.clone()),
            ));
        };

        let python = match config.python_path() {
            Ok(python) => python,
            Err(_) => {
                return SeparatorHandle::from_startup::<SpleeterWorker>(Err(
                    SeparationError::PythonNotFound,
                ))
            }
        };

        let started = Instant::now();
        let result = SpleeterWorker::spawn(
            &python,
            model,
            &config.separation.codec,
            config.separation.warm_up,
            config.startup_timeout(),
        )
        .await;
        if result.is_ok() {
            info!(
                "Separation model {} loaded in {:.1}s",
                model,
                started.elapsed().as_secs_f64()
            );
        }
        SeparatorHandle::from_startup(result)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn intake(&self) -> &FileIntake {
        &self.intake
    }

    pub fn separator(&self) -> &SeparatorHandle {
        &self.separator
    }

    pub fn processed_dir(&self) -> &Path {
        &self.config.storage.processed_dir
    }

    /// Fails with `ServiceUnavailable` when the model never loaded
    pub fn ensure_separator(&self) -> Result<()> {
        self.separator
            .get()
            .map(|_| ())
            .map_err(|reason| StemforgeError::ServiceUnavailable {
                reason: reason.to_string(),
            })
    }

    /// Split an upload into stems under `processed/<base>/`
    pub async fn separate(&self, upload: &UploadedFile) -> Result<JobOutput> {
        let separator = self
            .separator
            .get()
            .map_err(|reason| StemforgeError::ServiceUnavailable {
                reason: reason.to_string(),
            })?;

        let base = upload.base_name();
        let artifacts = separator
            .stems()
            .iter()
            .map(|stem| {
                OutputArtifact::new(
                    *stem,
                    self.processed_dir(),
                    &format!("{}/{}.{}", base, stem, separator.codec()),
                )
            })
            .collect::<Vec<_>>();

        // Stems from an earlier upload with the same name must not satisfy verification
        clear_outputs(&artifacts).await?;

        let started = Instant::now();
        info!("Separating {} with {}", upload.path.display(), separator.name());

        separator
            .separate(&upload.path, self.processed_dir())
            .await
            .map_err(|e| {
                error!(
                    stage = "separate",
                    input = %upload.path.display(),
                    model = separator.name(),
                    "Separation failed: {}", e
                );
                e
            })?;

        verify_outputs(&artifacts).await?;

        info!(
            "Separated {} into {} stems in {:.1}s",
            upload.sanitized_name,
            artifacts.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(JobOutput::new(artifacts))
    }

    /// Transcode an upload to WAV, reduce noise, write `processed/enhanced_<base>.wav`
    pub async fn enhance(&self, upload: &UploadedFile) -> Result<JobOutput> {
        let started = Instant::now();
        info!("Enhancing {}", upload.path.display());

        // Per-request scratch space; removed when this call returns
        let scratch = tempfile::Builder::new()
            .prefix(".job-")
            .tempdir_in(self.intake.upload_dir())?;
        let transcoded = scratch.path().join("transcoded.wav");

        let ffmpeg = self.config.ffmpeg_path().map_err(|e| {
            error!(stage = "transcode", input = %upload.path.display(), "{}", e);
            TranscodeError::FfmpegNotFound
        })?;

        Transcoder::new(ffmpeg)
            .to_wav(&upload.path, &transcoded)
            .await
            .map_err(|e| {
                error!(stage = "transcode", input = %upload.path.display(), "Transcode failed: {}", e);
                e
            })?;

        tokio::fs::create_dir_all(self.processed_dir()).await?;
        let artifact = OutputArtifact::new(
            ENHANCED,
            self.processed_dir(),
            &format!("{}{}.wav", self.config.enhance.output_prefix, upload.base_name()),
        );

        let report = self
            .enhancer
            .enhance(&transcoded, &artifact.path)
            .await
            .map_err(|e| {
                error!(stage = "denoise", input = %transcoded.display(), "Noise reduction failed: {}", e);
                e
            })?;

        let artifacts = vec![artifact];
        verify_outputs(&artifacts).await?;

        info!(
            "Enhanced {} ({} frames, {} Hz) in {:.1}s",
            upload.sanitized_name,
            report.frames,
            report.sample_rate,
            started.elapsed().as_secs_f64()
        );
        Ok(JobOutput::new(artifacts))
    }
}

async fn clear_outputs(artifacts: &[OutputArtifact]) -> Result<()> {
    for artifact in artifacts {
        match tokio::fs::remove_file(&artifact.path).await {
            Ok(()) => debug!("Removed stale output {}", artifact.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
