//! Noise reduction for transcoded WAV files

mod spectral_gate;
mod wav;

pub use spectral_gate::{SpectralGate, SpectralGateConfig};
pub use wav::{read_wav, write_wav, AudioData};

use crate::error::EnhanceError;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// What the enhancer wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhanceReport {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: usize,
}

/// Reads a WAV, gates each channel, writes 16-bit PCM at the input rate
#[derive(Debug, Clone)]
pub struct Enhancer {
    config: SpectralGateConfig,
}

impl Enhancer {
    pub fn new(config: SpectralGateConfig) -> Self {
        Self { config }
    }

    /// Denoise `input` into `output` on the blocking pool
    pub async fn enhance(&self, input: &Path, output: &Path) -> Result<EnhanceReport, EnhanceError> {
        let config = self.config.clone();
        let input: PathBuf = input.to_path_buf();
        let output: PathBuf = output.to_path_buf();

        tokio::task::spawn_blocking(move || enhance_file(config, &input, &output))
            .await
            .map_err(|e| EnhanceError::Join(e.to_string()))?
    }
}

fn enhance_file(
    config: SpectralGateConfig,
    input: &Path,
    output: &Path,
) -> Result<EnhanceReport, EnhanceError> {
    let started = Instant::now();
    info!("Reducing noise in {}", input.display());

    let audio = read_wav(input)?;
    if audio.frames() == 0 {
        return Err(EnhanceError::EmptyAudio);
    }
    debug!(
        "Loaded {} frames, {} channel(s) at {} Hz",
        audio.frames(),
        audio.channel_count(),
        audio.sample_rate
    );

    let gate = SpectralGate::new(config);
    let channels = audio
        .channels
        .iter()
        .map(|channel| gate.process(channel))
        .collect::<Result<Vec<_>, _>>()?;

    let denoised = AudioData {
        sample_rate: audio.sample_rate,
        channels,
    };
    write_wav(output, &denoised)?;

    debug!(
        "Noise reduction finished in {:.2}s: {}",
        started.elapsed().as_secs_f64(),
        output.display()
    );

    Ok(EnhanceReport {
        sample_rate: denoised.sample_rate,
        channels: denoised.channel_count(),
        frames: denoised.frames(),
    })
}
