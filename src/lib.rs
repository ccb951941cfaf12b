//! airwave: live PCM stream player for the terminal.
//!
//! Binary frames of little-endian f32 mono samples arrive over a WebSocket,
//! are scheduled gaplessly on the audio output clock and are drawn as a rolling
//! waveform and a scrolling spectrogram.

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod playback;
pub mod stream;
pub mod ui;
pub mod visualizations;
