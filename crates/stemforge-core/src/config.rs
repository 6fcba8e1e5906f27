//! Configuration management for stemforge

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub paths: PathsConfig,
    pub separation: SeparationConfig,
    pub enhance: EnhanceConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub host: String,
    /// Listen port (the bare `PORT` variable also sets this)
    pub port: u16,
    /// Maximum request body size in MiB
    pub max_upload_mb: usize,
    /// Locale used when the client sends no Accept-Language: "ar" or "en"
    pub default_locale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where uploads are stored
    pub upload_dir: PathBuf,
    /// Where generated outputs are stored and served from
    pub processed_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Path to FFmpeg binary (auto-detected if not set)
    pub ffmpeg: Option<PathBuf>,
    /// Path to Python binary (auto-detected if not set)
    pub python: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparationConfig {
    /// Start the separation model at startup
    pub enabled: bool,
    /// Spleeter model: "spleeter:2stems", "spleeter:4stems" or "spleeter:5stems"
    pub model: String,
    /// Stem file codec written by the model
    pub codec: String,
    /// Run one dummy inference at startup so the first request is not slow
    pub warm_up: bool,
    /// Seconds to wait for the model to load
    pub startup_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceConfig {
    /// Prefix of the enhanced output file name
    pub output_prefix: String,
    /// STFT frame length in samples
    pub n_fft: usize,
    /// STFT hop length in samples
    pub hop_length: usize,
    /// Standard deviations above the mean (dB) a bin must reach to count as signal
    pub n_std_thresh: f32,
    /// Fraction of the noise removed, 0.0 to 1.0
    pub prop_decrease: f32,
    /// Mask smoothing across frequency bins
    pub freq_smooth_bins: usize,
    /// Mask smoothing across frames
    pub time_smooth_frames: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Periodically delete old uploads and outputs
    pub enabled: bool,
    /// Age after which files are deleted
    pub max_age_hours: u64,
    /// Minutes between sweeps
    pub sweep_interval_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                max_upload_mb: 256,
                default_locale: "ar".to_string(),
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                processed_dir: PathBuf::from("processed"),
            },
            paths: PathsConfig {
                ffmpeg: None,
                python: None,
            },
            separation: SeparationConfig {
                enabled: true,
                model: "spleeter:2stems".to_string(),
                codec: "wav".to_string(),
                warm_up: true,
                startup_timeout_secs: 600,
            },
            enhance: EnhanceConfig {
                output_prefix: "enhanced_".to_string(),
                n_fft: 2048,
                hop_length: 512,
                n_std_thresh: 1.5,
                prop_decrease: 1.0,
                freq_smooth_bins: 3,
                time_smooth_frames: 5,
            },
            retention: RetentionConfig {
                enabled: false,
                max_age_hours: 24,
                sweep_interval_minutes: 60,
            },
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Load from default config directory
        if let Some(path) = Self::default_config_file() {
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
            }
        }

        // Load from specified config file
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ConfigError::LoadError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment
        figment = figment
            .merge(Env::prefixed("STEMFORGE_").split("__"))
            .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()));

        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/stemforge/config.toml`
    pub fn default_config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("stemforge/config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.enhance.n_fft < 16 || !self.enhance.n_fft.is_power_of_two() {
            return Err(ConfigError::InvalidValue(format!(
                "enhance.n_fft must be a power of two >= 16 (got {})",
                self.enhance.n_fft
            )));
        }
        if self.enhance.hop_length == 0 || self.enhance.hop_length > self.enhance.n_fft {
            return Err(ConfigError::InvalidValue(format!(
                "enhance.hop_length must be in 1..={} (got {})",
                self.enhance.n_fft, self.enhance.hop_length
            )));
        }
        if !(0.0..=1.0).contains(&self.enhance.prop_decrease) {
            return Err(ConfigError::InvalidValue(format!(
                "enhance.prop_decrease must be within 0.0..=1.0 (got {})",
                self.enhance.prop_decrease
            )));
        }
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::InvalidValue(
                "server.max_upload_mb must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get FFmpeg path, auto-detecting if not configured
    pub fn ffmpeg_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.paths.ffmpeg {
            Ok(path.clone())
        } else {
            which::which("ffmpeg")
                .map_err(|_| ConfigError::InvalidValue("ffmpeg not found in PATH".to_string()))
        }
    }

    /// Get Python path, preferring venv if available
    pub fn python_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.paths.python {
            return Ok(path.clone());
        }

        for path in Self::venv_python_candidates() {
            if path.exists() {
                return Ok(path);
            }
        }

        // Fall back to system Python
        which::which("python3")
            .map_err(|_| ConfigError::InvalidValue("python3 not found in PATH".to_string()))
    }

    /// Locations `stemforge setup-models` may have created a venv in
    pub fn venv_python_candidates() -> Vec<PathBuf> {
        [
            // macOS standard (dirs::data_dir())
            dirs::data_dir().map(|d| d.join("stemforge/venv/bin/python")),
            // XDG standard (~/.local/share)
            dirs::home_dir().map(|d| d.join(".local/share/stemforge/venv/bin/python")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.separation.startup_timeout_secs)
    }

    pub fn retention_max_age(&self) -> Duration {
        Duration::from_secs(self.retention.max_age_hours.saturating_mul(3600))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention.sweep_interval_minutes.max(1).saturating_mul(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.storage.processed_dir, PathBuf::from("processed"));
        assert_eq!(config.separation.model, "spleeter:2stems");
        assert_eq!(config.enhance.output_prefix, "enhanced_");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stemforge.toml");
        std::fs::write(
            &file,
            "[storage]\nprocessed_dir = \"/srv/out\"\n\n[enhance]\nprop_decrease = 0.5\n",
        )
        .unwrap();

        let config = Config::load(Some(&file)).unwrap();
        assert_eq!(config.storage.processed_dir, PathBuf::from("/srv/out"));
        assert_eq!(config.enhance.prop_decrease, 0.5);
        assert_eq!(config.enhance.n_fft, 2048);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/stemforge.toml")));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_fft() {
        let mut config = Config::default();
        config.enhance.n_fft = 1000;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = Config::default();
        config.enhance.hop_length = 4096;
        assert!(config.validate().is_err());
    }
}
