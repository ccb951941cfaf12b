//! Time-domain waveform export.
//!
//! Waveform redraws are expensive relative to audio scheduling, so the ring
//! buffer is snapshotted at a throttled cadence rather than per frame.

use std::time::{Duration, Instant};

use crate::stream::{lock_ring, SharedRing};

/// Default minimum gap between exports (about six updates per second).
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_millis(166);

/// Chronological samples handed to the waveform display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformSegment {
    pub samples: Vec<f32>,
}

impl WaveformSegment {
    /// Reduces the segment to `columns` (min, max) pairs, oldest first.
    ///
    /// Columns with no samples (segment shorter than the display) are `(0.0, 0.0)`
    /// and sit at the leading edge, so the newest audio always lines up on the right.
    pub fn envelope(&self, columns: usize) -> Vec<(f32, f32)> {
        if columns == 0 {
            return Vec::new();
        }

        let len = self.samples.len();
        let mut out = vec![(0.0, 0.0); columns];
        if len == 0 {
            return out;
        }

        let filled = columns.min(len);
        let offset = columns - filled;
        for (i, slot) in out[offset..].iter_mut().enumerate() {
            let start = i * len / filled;
            let end = ((i + 1) * len / filled).max(start + 1);
            let chunk = &self.samples[start..end];
            let min = chunk.iter().copied().fold(f32::INFINITY, f32::min);
            let max = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            *slot = (min, max);
        }
        out
    }
}

/// Throttled snapshotter of the waveform ring buffer.
#[derive(Debug)]
pub struct WaveformExporter {
    min_interval: Duration,
    last_export: Option<Instant>,
}

impl WaveformExporter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_export: None,
        }
    }

    /// Snapshots `ring` if at least `min_interval` has passed since the last export.
    pub fn poll(&mut self, now: Instant, ring: &SharedRing) -> Option<WaveformSegment> {
        if let Some(last) = self.last_export {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }
        self.last_export = Some(now);
        let samples = lock_ring(ring).snapshot();
        Some(WaveformSegment { samples })
    }

    /// Forces the next poll to export.
    pub fn invalidate(&mut self) {
        self.last_export = None;
    }
}

impl Default for WaveformExporter {
    fn default() -> Self {
        Self::new(DEFAULT_EXPORT_INTERVAL)
    }
}
