use serde::Deserialize;
use std::path::Path;

use crate::effect::EffectMode;

/// Lower edge of the bass band in Hz.
pub const BASS_FREQ_MIN: f64 = 20.0;
/// Upper edge of the bass band in Hz.
pub const BASS_FREQ_MAX: f64 = 140.0;
/// Bass energy (0-255 scale) that must be exceeded to register a hit.
pub const PEAK_THRESHOLD: f64 = 190.0;
/// Minimum spacing between accepted hits, in seconds.
pub const MIN_PEAK_INTERVAL: f64 = 0.12;
/// Length of one discrete shake.
pub const SHAKE_DURATION_MS: f64 = 180.0;
/// Floor for the discrete shake window, in seconds.
pub const MIN_SHAKE_WINDOW: f64 = 0.05;
/// Peak translation of a discrete shake, in pixels.
pub const SHAKE_AMPLITUDE_PX: f64 = 8.0;
/// Peak translation of continuous vibration, in pixels.
pub const VIBRATION_MAX_AMPLITUDE: f64 = 2.0;
/// Energy at or below which continuous vibration is off.
pub const VIBRATION_ENERGY_THRESHOLD: f64 = 0.20 * PEAK_THRESHOLD;
/// Energy at which continuous vibration reaches full amplitude.
pub const VIBRATION_ENERGY_MAX_SCALE: f64 = 1.00 * PEAK_THRESHOLD;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analyser: AnalyserConfig,
    #[serde(default)]
    pub effect: EffectConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default)]
    pub bitrate: Option<String>,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

/// Settings of the filter + analyser pipeline feeding the detector.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyserConfig {
    /// FFT length; the snapshot has `fft_size / 2` bins.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Temporal smoothing of bin magnitudes between polls (0.0-1.0).
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
    /// Cutoff of the low-pass stage ahead of the analyser.
    #[serde(default = "default_lowpass_hz")]
    pub lowpass_hz: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EffectConfig {
    #[serde(default)]
    pub mode: EffectMode,
    /// Fixed RNG seed for reproducible jitter.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            crf: default_crf(),
            bitrate: None,
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_db: default_min_db(),
            max_db: default_max_db(),
            lowpass_hz: default_lowpass_hz(),
        }
    }
}

fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_crf() -> u32 { 18 }
fn default_audio_bitrate() -> String { "192k".into() }
fn default_fft_size() -> usize { 2048 }
fn default_smoothing() -> f32 { 0.8 }
fn default_min_db() -> f32 { -100.0 }
fn default_max_db() -> f32 { -30.0 }
fn default_lowpass_hz() -> f32 { 200.0 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path first, then `./bassquake.toml`, then the user config dirs.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<std::path::PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = std::path::PathBuf::from("bassquake.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("bassquake").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("bassquake").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
