//! WAV file I/O for the enhancement stage

use crate::error::EnhanceError;
use hound::SampleFormat;
use std::path::Path;

/// Planar f32 audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioData {
    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }
}

/// Read a WAV file into planar samples in [-1.0, 1.0]
pub fn read_wav(path: &Path) -> Result<AudioData, EnhanceError> {
    let file = std::fs::File::open(path)
        .map_err(|err| EnhanceError::Decode(format!("{}: {err}", path.display())))?;
    let buf_reader = std::io::BufReader::with_capacity(1024 * 1024, file);
    let mut reader =
        hound::WavReader::new(buf_reader).map_err(|err| EnhanceError::Decode(err.to_string()))?;
    let spec = reader.spec();

    let interleaved = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| EnhanceError::Decode(format!("Sample error: {err}")))?,
        SampleFormat::Int => {
            let scale = (1i64 << spec.bits_per_sample.saturating_sub(1)).max(1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|value| value as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| EnhanceError::Decode(format!("Sample error: {err}")))?
        }
    };

    let channel_count = spec.channels.max(1) as usize;
    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    Ok(AudioData {
        sample_rate: spec.sample_rate,
        channels,
    })
}

/// Write planar samples as 16-bit PCM.
///
/// Samples go to a temporary file next to `path` that replaces `path` only
/// once the header is finalized.
pub fn write_wav(path: &Path, audio: &AudioData) -> Result<(), EnhanceError> {
    let spec = hound::WavSpec {
        channels: audio.channel_count(),
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".wav-")
        .tempfile_in(dir)
        .map_err(|err| EnhanceError::Encode(format!("{}: {err}", path.display())))?;

    {
        let buf_writer = std::io::BufWriter::with_capacity(1024 * 1024, temp.as_file_mut());
        let mut writer = hound::WavWriter::new(buf_writer, spec)
            .map_err(|err| EnhanceError::Encode(err.to_string()))?;

        for i in 0..audio.frames() {
            for channel in &audio.channels {
                let sample = (channel[i].clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                writer
                    .write_sample(sample)
                    .map_err(|err| EnhanceError::Encode(err.to_string()))?;
            }
        }

        writer
            .finalize()
            .map_err(|err| EnhanceError::Encode(err.to_string()))?;
    }

    temp.persist(path)
        .map_err(|err| EnhanceError::Encode(format!("{}: {}", path.display(), err.error)))?;
    Ok(())
}
