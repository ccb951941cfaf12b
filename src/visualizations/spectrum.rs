//! Frequency analysis of the scheduled audio using FFT.
//!
//! Produces byte-scaled magnitude bins from 0 Hz up to Nyquist for the
//! spectrogram, one call per refresh tick.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Frequency-transform capability the refresh path drives every tick.
pub trait SpectrumAnalyzer: Send {
    /// Number of magnitude bins returned by `analyze`.
    fn bin_count(&self) -> usize;

    /// Sample rate the bins are relative to.
    fn sample_rate(&self) -> u32;

    /// Analyzes the newest samples of `window` and returns magnitudes in 0-255.
    fn analyze(&mut self, window: &[f32]) -> &[u8];

    /// Frequency at the top edge of the bin range.
    fn nyquist(&self) -> f32 {
        self.sample_rate() as f32 / 2.0
    }

    /// Clears smoothing history.
    fn reset(&mut self);
}

/// Tuning for the FFT analyzer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    /// Transform size in samples, a power of two
    pub fft_size: usize,
    /// Weight of the previous magnitude when averaging successive calls (0.0-1.0)
    pub smoothing: f32,
    /// Magnitude mapped to byte 0
    pub min_db: f32,
    /// Magnitude mapped to byte 255
    pub max_db: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// Stateful Blackman-windowed FFT analyzer with temporal smoothing.
pub struct FftAnalyzer {
    config: AnalyzerConfig,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl FftAnalyzer {
    pub fn new(sample_rate: u32, config: AnalyzerConfig) -> Self {
        let size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        Self {
            config,
            sample_rate,
            fft,
            window: blackman_window(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
            smoothed: vec![0.0; size / 2],
            bytes: vec![0; size / 2],
        }
    }

}

impl SpectrumAnalyzer for FftAnalyzer {
    fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn analyze(&mut self, window: &[f32]) -> &[u8] {
        let size = self.config.fft_size;
        let take = window.len().min(size);
        let recent = &window[window.len() - take..];
        // Short input is aligned to the end; the front stays silent
        let pad = size - take;

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { recent[i - pad] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let tau = self.config.smoothing;
        let db_range = self.config.max_db - self.config.min_db;
        let norm = 1.0 / size as f32;

        for ((smoothed, byte), bin) in self
            .smoothed
            .iter_mut()
            .zip(self.bytes.iter_mut())
            .zip(self.buffer.iter())
        {
            let magnitude = bin.norm() * norm;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

            *byte = if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                ((db - self.config.min_db) / db_range * 255.0).clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }

        &self.bytes
    }

    fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.bytes.fill(0);
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    let n = size as f32;
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / n;
            A0 - A1 * phase.cos() + A2 * (2.0 * phase).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn analyzer(smoothing: f32) -> FftAnalyzer {
        FftAnalyzer::new(
            48_000,
            AnalyzerConfig {
                fft_size: 1024,
                smoothing,
                ..AnalyzerConfig::default()
            },
        )
    }

    #[test]
    fn test_bins_cover_zero_to_nyquist() {
        let analyzer = analyzer(0.0);
        assert_eq!(analyzer.bin_count(), 512);
        assert_eq!(analyzer.nyquist(), 24_000.0);
    }

    #[test]
    fn test_silence_yields_zero_bins() {
        let mut analyzer = analyzer(0.8);
        let bins = analyzer.analyze(&vec![0.0; 1024]);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let mut analyzer = analyzer(0.0);
        // Bin 64 of a 1024-point transform at 48kHz is 3000Hz
        let quiet: Vec<f32> = sine(3000.0, 48_000, 4096).iter().map(|s| s * 0.01).collect();
        let bins = analyzer.analyze(&quiet).to_vec();

        let mut peak = 0;
        for (i, &value) in bins.iter().enumerate() {
            if value > bins[peak] {
                peak = i;
            }
        }
        assert_eq!(peak, 64);
        assert!(bins[64] > bins[63] && bins[64] > bins[65]);
        assert!(bins[400] < bins[64]);
    }

    #[test]
    fn test_smoothing_carries_energy_into_next_call() {
        let tone = sine(3000.0, 48_000, 1024);
        let silence = vec![0.0; 1024];

        let mut smoothed = analyzer(0.8);
        smoothed.analyze(&tone);
        assert!(smoothed.analyze(&silence)[64] > 0);

        let mut unsmoothed = analyzer(0.0);
        unsmoothed.analyze(&tone);
        assert_eq!(unsmoothed.analyze(&silence)[64], 0);
    }

    #[test]
    fn test_short_window_is_zero_padded() {
        let mut analyzer = analyzer(0.0);
        let bins = analyzer.analyze(&[0.0; 10]);
        assert_eq!(bins.len(), 512);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut analyzer = analyzer(0.9);
        analyzer.analyze(&sine(3000.0, 48_000, 1024));
        analyzer.reset();
        assert!(analyzer.analyze(&[0.0; 1024]).iter().all(|&b| b == 0));
    }
}
