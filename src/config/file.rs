//! Configuration file management for airwave.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory and created with
//! defaults on first run.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::visualizations::{AnalyzerConfig, FrequencyScale};

/// Reconnect policy applied when the stream closes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    /// Reconnect after the stream closes instead of stopping
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Delay before the first reconnect attempt
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for the doubling delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Attempts before giving up, 0 for unlimited
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: 0,
        }
    }
}

/// Inbound stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// WebSocket URL delivering little-endian f32 mono frames
    #[serde(default = "default_url")]
    pub url: String,
    /// Sample rate agreed with the producer, in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            sample_rate: default_sample_rate(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Audio output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `airwave list-devices`
    /// - device name from `airwave list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Forward offset added to the audio clock when scheduling, absorbs arrival jitter
    #[serde(default = "default_lead_time_ms")]
    pub lead_time_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            lead_time_ms: default_lead_time_ms(),
        }
    }
}

impl PlaybackConfig {
    pub fn lead_time(&self) -> Duration {
        Duration::from_millis(self.lead_time_ms)
    }
}

/// Visual refresh and analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualsConfig {
    /// Spectrogram ticks per second
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u32,
    /// Seconds of audio kept for the waveform view
    #[serde(default = "default_history_seconds")]
    pub history_seconds: f32,
    /// Minimum gap between waveform redraws
    #[serde(default = "default_waveform_interval_ms")]
    pub waveform_interval_ms: u64,
    /// FFT size in samples (power of two)
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Averaging weight between successive spectra (0.0-1.0)
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Magnitude shown as the darkest colour, in dB
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    /// Magnitude shown as the brightest colour, in dB
    #[serde(default = "default_max_db")]
    pub max_db: f32,
    /// Spectrogram vertical scale: "linear" or "log"
    #[serde(default)]
    pub frequency_scale: FrequencyScale,
    /// Number of frequency labels on the spectrogram axis
    #[serde(default = "default_axis_ticks")]
    pub axis_ticks: usize,
    /// RMS multiplier for the loudness level before clamping to [0, 1]
    #[serde(default = "default_level_scale")]
    pub level_scale: f32,
}

impl Default for VisualsConfig {
    fn default() -> Self {
        Self {
            refresh_hz: default_refresh_hz(),
            history_seconds: default_history_seconds(),
            waveform_interval_ms: default_waveform_interval_ms(),
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_db: default_min_db(),
            max_db: default_max_db(),
            frequency_scale: FrequencyScale::default(),
            axis_ticks: default_axis_ticks(),
            level_scale: default_level_scale(),
        }
    }
}

impl VisualsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_hz.clamp(1, MAX_REFRESH_HZ) as f64)
    }

    pub fn waveform_interval(&self) -> Duration {
        Duration::from_millis(self.waveform_interval_ms)
    }

    pub fn analyzer(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            fft_size: self.fft_size,
            smoothing: self.smoothing,
            min_db: self.min_db,
            max_db: self.max_db,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_url() -> String {
    "ws://localhost:8000/ws/audio".to_string()
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_device() -> String {
    "default".to_string()
}

fn default_lead_time_ms() -> u64 {
    50
}

/// Above this the redraw period rounds toward zero.
const MAX_REFRESH_HZ: u32 = 1000;

fn default_refresh_hz() -> u32 {
    30
}

fn default_history_seconds() -> f32 {
    5.0
}

fn default_waveform_interval_ms() -> u64 {
    166
}

fn default_fft_size() -> usize {
    2048
}

fn default_smoothing() -> f32 {
    0.8
}

fn default_min_db() -> f32 {
    -100.0
}

fn default_max_db() -> f32 {
    -30.0
}

fn default_axis_ticks() -> usize {
    6
}

fn default_level_scale() -> f32 {
    crate::stream::level::DEFAULT_LEVEL_SCALE
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AirwaveConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub visuals: VisualsConfig,
}

impl AirwaveConfig {
    /// Loads configuration from the user's config directory, writing defaults first if missing.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read or created
    /// - If the TOML is malformed or fails validation
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            let defaults = Self::default();
            defaults.save()?;
            tracing::info!("Default configuration written to {}", config_path.display());
            return Ok(defaults);
        }

        let config_content = fs::read_to_string(&config_path)?;
        Self::from_toml(&config_content)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// - If the TOML is malformed
    /// - If a value is out of range
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AirwaveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined or created
    /// - If the file cannot be written
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = get_config_path()?;
        let config_content = toml::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }

    /// Checks value ranges the pipeline relies on.
    ///
    /// # Errors
    /// - If any value is out of range, naming the offending key
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stream.sample_rate == 0 {
            return Err(anyhow!("stream.sample_rate must be greater than zero"));
        }
        let fft_size = self.visuals.fft_size;
        if fft_size < 32 || !fft_size.is_power_of_two() {
            return Err(anyhow!(
                "visuals.fft_size must be a power of two of at least 32 (got {fft_size})"
            ));
        }
        if !(0.0..1.0).contains(&self.visuals.smoothing) {
            return Err(anyhow!("visuals.smoothing must be within [0.0, 1.0)"));
        }
        if self.visuals.min_db >= self.visuals.max_db {
            return Err(anyhow!("visuals.min_db must be below visuals.max_db"));
        }
        if !(1..=MAX_REFRESH_HZ).contains(&self.visuals.refresh_hz) {
            return Err(anyhow!(
                "visuals.refresh_hz must be between 1 and {MAX_REFRESH_HZ}"
            ));
        }
        if self.visuals.history_seconds <= 0.0 {
            return Err(anyhow!("visuals.history_seconds must be greater than zero"));
        }
        if self.visuals.level_scale < 0.0 {
            return Err(anyhow!("visuals.level_scale must not be negative"));
        }
        Ok(())
    }
}

/// Retrieves the path to the config file, creating its directory.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let config_dir = dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not find home directory"))?
        .join(".config")
        .join("airwave");

    fs::create_dir_all(&config_dir)
        .map_err(|e| anyhow!("Failed to create config directory: {e}"))?;

    Ok(config_dir.join("airwave.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AirwaveConfig::from_toml("").unwrap();
        assert_eq!(config, AirwaveConfig::default());
        assert_eq!(config.stream.sample_rate, 48_000);
        assert_eq!(config.playback.lead_time(), Duration::from_millis(50));
        assert_eq!(config.visuals.axis_ticks, 6);
        assert_eq!(config.visuals.level_scale, 2.0);
    }

    #[test]
    fn test_partial_document_overrides() {
        let config = AirwaveConfig::from_toml(
            r#"
            [stream]
            url = "ws://radio.local:9000/ws/audio"

            [stream.reconnect]
            enabled = false

            [visuals]
            frequency_scale = "log"
            fft_size = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.url, "ws://radio.local:9000/ws/audio");
        assert!(!config.stream.reconnect.enabled);
        assert_eq!(config.stream.reconnect.initial_delay_ms, 500);
        assert_eq!(config.visuals.frequency_scale, FrequencyScale::Log);
        assert_eq!(config.visuals.analyzer().fft_size, 1024);
        assert_eq!(config.visuals.refresh_hz, 30);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = AirwaveConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(AirwaveConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AirwaveConfig::from_toml("[visuals]\nfft_size = 1000").is_err());
        assert!(AirwaveConfig::from_toml("[visuals]\nsmoothing = 1.0").is_err());
        assert!(AirwaveConfig::from_toml("[visuals]\nmin_db = -20.0").is_err());
        assert!(AirwaveConfig::from_toml("[stream]\nsample_rate = 0").is_err());
        assert!(AirwaveConfig::from_toml("[visuals]\nrefresh_hz = 0").is_err());
        assert!(AirwaveConfig::from_toml("[visuals]\nrefresh_hz = 1001").is_err());
        assert!(AirwaveConfig::from_toml("[visuals]\nrefresh_hz = 1000").is_ok());
    }

    #[test]
    fn test_refresh_interval_is_never_zero() {
        let visuals = VisualsConfig {
            refresh_hz: u32::MAX,
            ..VisualsConfig::default()
        };
        assert_eq!(visuals.refresh_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_refresh_interval() {
        let visuals = VisualsConfig {
            refresh_hz: 20,
            ..VisualsConfig::default()
        };
        assert_eq!(visuals.refresh_interval(), Duration::from_millis(50));
    }
}
