//! Per-frame loudness metering.
//!
//! Root-mean-square of the frame, multiplied by a fixed scale so typical
//! broadcast peaks land in a visible range, then clamped to [0, 1]. Smoothing
//! and peak hold are left to whoever displays the value.

use super::decoder::AudioFrame;

/// Default RMS multiplier.
pub const DEFAULT_LEVEL_SCALE: f32 = 2.0;

/// Normalized loudness of the most recent frame, always within [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct LevelState(f32);

impl LevelState {
    pub const SILENT: LevelState = LevelState(0.0);

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::SILENT;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Level as a whole percentage for display.
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round() as u8
    }
}

/// Stateless RMS meter.
#[derive(Debug, Clone, Copy)]
pub struct LevelMeter {
    scale: f32,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL_SCALE)
    }
}

impl LevelMeter {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }

    pub fn measure(&self, frame: &AudioFrame) -> LevelState {
        LevelState::new(rms(frame.samples()) * self.scale)
    }
}

/// Root-mean-square of a sample slice; zero for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_of_squares / samples.len() as f64).sqrt() as f32
}
