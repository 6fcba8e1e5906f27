//! Stationary spectral gate
//!
//! Offline noise reduction over a whole signal:
//! - per-bin noise threshold from the dB magnitude statistics of all frames
//! - binary signal mask, smoothed over time and frequency
//! - STFT resynthesis with window-square normalization

use crate::config::EnhanceConfig;
use crate::error::EnhanceError;

use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Spectral gate parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralGateConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_std_thresh: f32,
    pub prop_decrease: f32,
    pub freq_smooth_bins: usize,
    pub time_smooth_frames: usize,
}

impl Default for SpectralGateConfig {
    fn default() -> Self {
        Self::from(&EnhanceConfig {
            output_prefix: String::new(),
            n_fft: 2048,
            hop_length: 512,
            n_std_thresh: 1.5,
            prop_decrease: 1.0,
            freq_smooth_bins: 3,
            time_smooth_frames: 5,
        })
    }
}

impl From<&EnhanceConfig> for SpectralGateConfig {
    fn from(config: &EnhanceConfig) -> Self {
        Self {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            n_std_thresh: config.n_std_thresh,
            prop_decrease: config.prop_decrease.clamp(0.0, 1.0),
            freq_smooth_bins: config.freq_smooth_bins.max(1),
            time_smooth_frames: config.time_smooth_frames.max(1),
        }
    }
}

/// Offline spectral gate
pub struct SpectralGate {
    config: SpectralGateConfig,
    num_bins: usize,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    window: Vec<f32>,
}

/// Per-frame scratch buffers
struct Scratch {
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
    fft: Vec<Complex32>,
    ifft: Vec<Complex32>,
}

impl SpectralGate {
    pub fn new(config: SpectralGateConfig) -> Self {
        let n_fft = config.n_fft;

        let mut planner = RealFftPlanner::new();
        let fft_forward = planner.plan_fft_forward(n_fft);
        let fft_inverse = planner.plan_fft_inverse(n_fft);

        // Periodic Hann window
        let window = (0..n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_fft as f32).cos()))
            .collect();

        Self {
            num_bins: n_fft / 2 + 1,
            config,
            fft_forward,
            fft_inverse,
            window,
        }
    }

    pub fn config(&self) -> &SpectralGateConfig {
        &self.config
    }

    /// Denoise one channel. The output has the same length as the input.
    pub fn process(&self, signal: &[f32]) -> Result<Vec<f32>, EnhanceError> {
        if signal.is_empty() {
            return Ok(Vec::new());
        }

        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let pad = n_fft / 2;

        // Centered frames: zero padding of n_fft/2 on the left, enough on the right
        let num_frames = 1 + signal.len().div_ceil(hop);
        let padded_len = (num_frames - 1) * hop + n_fft;
        let mut padded = vec![0.0f32; padded_len];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let mut scratch = self.scratch();

        // Pass 1: per-bin dB statistics (Welford)
        let mut mean = vec![0.0f64; self.num_bins];
        let mut m2 = vec![0.0f64; self.num_bins];
        for t in 0..num_frames {
            self.analyze(&padded[t * hop..t * hop + n_fft], &mut scratch)?;
            let count = (t + 1) as f64;
            for (f, c) in scratch.spectrum.iter().enumerate() {
                let db = amplitude_to_db(c.norm()) as f64;
                let delta = db - mean[f];
                mean[f] += delta / count;
                m2[f] += delta * (db - mean[f]);
            }
        }

        let threshold: Vec<f32> = mean
            .iter()
            .zip(&m2)
            .map(|(&mu, &m)| {
                let std = (m / num_frames as f64).sqrt();
                (mu + self.config.n_std_thresh as f64 * std) as f32
            })
            .collect();

        // Pass 2: binary mask
        let mut mask = vec![0u8; num_frames * self.num_bins];
        for t in 0..num_frames {
            self.analyze(&padded[t * hop..t * hop + n_fft], &mut scratch)?;
            let row = &mut mask[t * self.num_bins..(t + 1) * self.num_bins];
            for (f, c) in scratch.spectrum.iter().enumerate() {
                row[f] = u8::from(amplitude_to_db(c.norm()) > threshold[f]);
            }
        }

        // Pass 3: apply smoothed gains and overlap-add
        let mut output = vec![0.0f32; padded_len];
        let mut window_sum = vec![0.0f32; padded_len];
        let mut gains = vec![0.0f32; self.num_bins];
        let norm = 1.0 / n_fft as f32;

        for t in 0..num_frames {
            self.smoothed_gains(&mask, num_frames, t, &mut gains);

            self.analyze(&padded[t * hop..t * hop + n_fft], &mut scratch)?;
            for (c, &g) in scratch.spectrum.iter_mut().zip(&gains) {
                *c *= g;
            }
            // DC and Nyquist must stay real for the inverse transform
            scratch.spectrum[0].im = 0.0;
            scratch.spectrum[self.num_bins - 1].im = 0.0;

            self.fft_inverse
                .process_with_scratch(&mut scratch.spectrum, &mut scratch.frame, &mut scratch.ifft)
                .map_err(|e| EnhanceError::Fft(e.to_string()))?;

            let start = t * hop;
            for (i, &w) in self.window.iter().enumerate() {
                output[start + i] += scratch.frame[i] * norm * w;
                window_sum[start + i] += w * w;
            }
        }

        Ok(output[pad..pad + signal.len()]
            .iter()
            .zip(&window_sum[pad..pad + signal.len()])
            .map(|(&s, &w)| if w > 1e-6 { s / w } else { 0.0 })
            .collect())
    }

    fn scratch(&self) -> Scratch {
        Scratch {
            frame: vec![0.0; self.config.n_fft],
            spectrum: vec![Complex32::new(0.0, 0.0); self.num_bins],
            fft: vec![Complex32::new(0.0, 0.0); self.fft_forward.get_scratch_len()],
            ifft: vec![Complex32::new(0.0, 0.0); self.fft_inverse.get_scratch_len()],
        }
    }

    /// Window one frame and transform it into `scratch.spectrum`
    fn analyze(&self, frame: &[f32], scratch: &mut Scratch) -> Result<(), EnhanceError> {
        for ((dst, &s), &w) in scratch.frame.iter_mut().zip(frame).zip(&self.window) {
            *dst = s * w;
        }
        self.fft_forward
            .process_with_scratch(&mut scratch.frame, &mut scratch.spectrum, &mut scratch.fft)
            .map_err(|e| EnhanceError::Fft(e.to_string()))
    }

    /// Box-averaged mask around frame `t`, turned into gains
    fn smoothed_gains(&self, mask: &[u8], num_frames: usize, t: usize, gains: &mut [f32]) {
        let half_t = self.config.time_smooth_frames / 2;
        let half_f = self.config.freq_smooth_bins / 2;
        let t_lo = t.saturating_sub(half_t);
        let t_hi = (t + half_t).min(num_frames - 1);

        let mut column = vec![0u32; self.num_bins];
        for row in t_lo..=t_hi {
            let row = &mask[row * self.num_bins..(row + 1) * self.num_bins];
            for (acc, &m) in column.iter_mut().zip(row) {
                *acc += m as u32;
            }
        }

        let rows = (t_hi - t_lo + 1) as f32;
        for (f, gain) in gains.iter_mut().enumerate() {
            let f_lo = f.saturating_sub(half_f);
            let f_hi = (f + half_f).min(self.num_bins - 1);
            let sum: u32 = column[f_lo..=f_hi].iter().sum();
            let smoothed = sum as f32 / (rows * (f_hi - f_lo + 1) as f32);
            *gain = 1.0 - self.config.prop_decrease * (1.0 - smoothed);
        }
    }
}

fn amplitude_to_db(magnitude: f32) -> f32 {
    20.0 * magnitude.max(1e-10).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: usize = 16_000;

    fn test_gate() -> SpectralGate {
        SpectralGate::new(SpectralGateConfig {
            n_fft: 512,
            hop_length: 128,
            ..SpectralGateConfig::default()
        })
    }

    /// Deterministic uniform noise in [-amplitude, amplitude]
    fn noise(len: usize, amplitude: f32) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_preserves_length() {
        let gate = test_gate();
        for len in [1, 100, 511, 512, 513, 4000] {
            let out = gate.process(&noise(len, 0.1)).unwrap();
            assert_eq!(out.len(), len);
        }
        assert!(gate.process(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_attenuates_stationary_noise() {
        let gate = test_gate();
        let input = noise(SAMPLE_RATE * 2, 0.05);
        let output = gate.process(&input).unwrap();
        assert!(
            rms(&output) < 0.5 * rms(&input),
            "noise rms {} -> {}",
            rms(&input),
            rms(&output)
        );
    }

    #[test]
    fn test_keeps_tone_burst() {
        let gate = test_gate();
        let mut input = noise(SAMPLE_RATE * 2, 0.05);
        let burst = (SAMPLE_RATE * 8 / 10)..SAMPLE_RATE;
        for i in burst.clone() {
            input[i] += 0.5 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / SAMPLE_RATE as f32).sin();
        }

        let output = gate.process(&input).unwrap();

        let middle = (SAMPLE_RATE * 85 / 100)..(SAMPLE_RATE * 95 / 100);
        let kept = rms(&output[middle.clone()]) / rms(&input[middle]);
        assert!(kept > 0.7, "tone kept ratio {kept}");

        let quiet = (SAMPLE_RATE * 2 / 10)..(SAMPLE_RATE * 6 / 10);
        let left = rms(&output[quiet.clone()]) / rms(&input[quiet]);
        assert!(left < 0.5, "noise left ratio {left}");
    }

    #[test]
    fn test_zero_decrease_is_identity() {
        let gate = SpectralGate::new(SpectralGateConfig {
            n_fft: 512,
            hop_length: 128,
            prop_decrease: 0.0,
            ..SpectralGateConfig::default()
        });
        let input = noise(3000, 0.3);
        let output = gate.process(&input).unwrap();
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }
}
