//! Application command handlers for airwave.
//!
//! # Commands
//! - `listen`: Play the live stream with waveform and spectrogram (default)
//! - `config`: Open configuration file in user's preferred editor
//! - `list_devices`: List available audio output devices
//! - `logs`: Display recent log entries

pub mod config;
pub mod list_devices;
pub mod listen;
pub mod logs;

pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use listen::{handle_listen, ListenOptions};
pub use logs::handle_logs;
