//! Configuration management for airwave.
//!
//! This module handles loading and saving application configuration from a TOML
//! file in the user's config directory.

pub mod file;

pub use file::{
    get_config_path, AirwaveConfig, PlaybackConfig, ReconnectConfig, StreamConfig, VisualsConfig,
};
