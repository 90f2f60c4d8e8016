use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::capture::block::FFT_LEN;

pub const DEFAULT_SAMPLE_RATE: u32 = 2_048_000;
pub const DEFAULT_CENTER_FREQ: u32 = 100_000_000;
pub const DEFAULT_BUF_LENGTH: usize = 16 * 16384;
pub const MINIMAL_BUF_LENGTH: usize = 512;
pub const MAXIMAL_BUF_LENGTH: usize = 256 * 16384;

const CONFIG_NAME: &str = "rtl-spectrum";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub index: u32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_center_freq")]
    pub center_freq: u32,
    /// Tuner gain in dB; 0 selects automatic gain.
    #[serde(default)]
    pub gain_db: f32,
    #[serde(default)]
    pub ppm: i32,
    /// Bytes per driver delivery.
    #[serde(default = "default_buf_len")]
    pub buf_len: usize,
}

#[derive(Debug, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_fft_len")]
    pub fft_len: usize,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// JSON-lines destination; "-" for stdout.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_log_every")]
    pub log_every: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            index: 0,
            sample_rate: default_sample_rate(),
            center_freq: default_center_freq(),
            gain_db: 0.0,
            ppm: 0,
            buf_len: default_buf_len(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fft_len: default_fft_len(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            log_every: default_log_every(),
        }
    }
}

fn default_sample_rate() -> u32 { DEFAULT_SAMPLE_RATE }
fn default_center_freq() -> u32 { DEFAULT_CENTER_FREQ }
fn default_buf_len() -> usize { DEFAULT_BUF_LENGTH }
fn default_fft_len() -> usize { FFT_LEN }
fn default_log_every() -> u64 { 50 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Explicit path, then `./rtl-spectrum.toml`, then the per-user config dirs.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(format!("{}.toml", CONFIG_NAME));
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join(CONFIG_NAME).join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join(CONFIG_NAME).join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Delivery size the driver accepts: a multiple of 512 within
/// [`MINIMAL_BUF_LENGTH`, `MAXIMAL_BUF_LENGTH`]. Anything else falls back to
/// the default.
pub fn validated_buf_len(requested: usize) -> usize {
    if !(MINIMAL_BUF_LENGTH..=MAXIMAL_BUF_LENGTH).contains(&requested) {
        log::warn!(
            "buffer length {} out of range {}..={}, using default {}",
            requested,
            MINIMAL_BUF_LENGTH,
            MAXIMAL_BUF_LENGTH,
            DEFAULT_BUF_LENGTH
        );
        return DEFAULT_BUF_LENGTH;
    }
    if requested % MINIMAL_BUF_LENGTH != 0 {
        log::warn!(
            "buffer length {} is not a multiple of {}, using default {}",
            requested,
            MINIMAL_BUF_LENGTH,
            DEFAULT_BUF_LENGTH
        );
        return DEFAULT_BUF_LENGTH;
    }
    requested
}

/// Closest supported tuner gain (tenths of a dB) to `target`.
#[cfg(any(test, feature = "rtlsdr"))]
pub fn nearest_gain(available: &[i32], target: i32) -> Option<i32> {
    available
        .iter()
        .copied()
        .min_by_key(|&g| (g - target).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.device, DeviceConfig::default());
        assert_eq!(cfg.device.sample_rate, 2_048_000);
        assert_eq!(cfg.device.center_freq, 100_000_000);
        assert_eq!(cfg.pipeline.fft_len, 4096);
        assert_eq!(cfg.output.log_every, 50);
        assert!(cfg.output.path.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [device]
            center_freq = 433920000
            gain_db = 28.0

            [output]
            path = "spectra.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.device.center_freq, 433_920_000);
        assert_eq!(cfg.device.gain_db, 28.0);
        assert_eq!(cfg.device.buf_len, DEFAULT_BUF_LENGTH);
        assert_eq!(cfg.output.path, Some(PathBuf::from("spectra.jsonl")));
        assert_eq!(cfg.pipeline.fft_len, FFT_LEN);
    }

    #[test]
    fn unreadable_config_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/rtl-spectrum.toml")).is_err());
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = Path::new("/tmp/custom.toml");
        assert_eq!(find_config(Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn buffer_length_validation() {
        assert_eq!(validated_buf_len(DEFAULT_BUF_LENGTH), DEFAULT_BUF_LENGTH);
        assert_eq!(validated_buf_len(512), 512);
        assert_eq!(validated_buf_len(MAXIMAL_BUF_LENGTH), MAXIMAL_BUF_LENGTH);
        assert_eq!(validated_buf_len(256), DEFAULT_BUF_LENGTH);
        assert_eq!(validated_buf_len(MAXIMAL_BUF_LENGTH + 512), DEFAULT_BUF_LENGTH);
        assert_eq!(validated_buf_len(1000), DEFAULT_BUF_LENGTH);
    }

    #[test]
    fn picks_nearest_supported_gain() {
        let gains = [0, 9, 14, 27, 37, 77, 87, 125, 144, 157];
        assert_eq!(nearest_gain(&gains, 30), Some(27));
        assert_eq!(nearest_gain(&gains, 1000), Some(157));
        assert_eq!(nearest_gain(&gains, -5), Some(0));
        assert_eq!(nearest_gain(&[], 30), None);
    }
}
