//! Fixed-capacity circular sample history.
//!
//! Holds the most recent `sample_rate × window` samples for the waveform view and,
//! with a smaller capacity, the most recently scheduled audio for the spectrum
//! analyzer. Allocated once, overwritten continuously, never resized.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Ring shared between the ingestion writer and the refresh reader.
pub type SharedRing = Arc<Mutex<SampleRing>>;

/// Circular buffer of f32 samples with chronological snapshots.
#[derive(Debug, Clone)]
pub struct SampleRing {
    data: Vec<f32>,
    /// Physical index the next sample is written to
    write_pos: usize,
    /// Number of valid samples, never above capacity
    len: usize,
    /// Samples pushed since creation or the last clear
    total_pushed: u64,
}

impl SampleRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            write_pos: 0,
            len: 0,
            total_pushed: 0,
        }
    }

    /// Capacity for `window_secs` seconds of audio at `sample_rate`.
    pub fn for_window(sample_rate: u32, window_secs: f32) -> Self {
        let capacity = (sample_rate as f64 * window_secs as f64).round().max(0.0) as usize;
        Self::with_capacity(capacity)
    }

    /// Wraps a new ring in the shared handle.
    pub fn shared(capacity: usize) -> SharedRing {
        Arc::new(Mutex::new(Self::with_capacity(capacity)))
    }

    pub fn shared_window(sample_rate: u32, window_secs: f32) -> SharedRing {
        Arc::new(Mutex::new(Self::for_window(sample_rate, window_secs)))
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Appends samples, overwriting the oldest data once full.
    ///
    /// A push longer than the capacity keeps only its newest `capacity` samples.
    pub fn push(&mut self, samples: &[f32]) {
        self.total_pushed += samples.len() as u64;

        let capacity = self.capacity();
        if capacity == 0 || samples.is_empty() {
            return;
        }

        let tail = &samples[samples.len().saturating_sub(capacity)..];

        let first = (capacity - self.write_pos).min(tail.len());
        self.data[self.write_pos..self.write_pos + first].copy_from_slice(&tail[..first]);
        let rest = tail.len() - first;
        self.data[..rest].copy_from_slice(&tail[first..]);

        self.write_pos = (self.write_pos + tail.len()) % capacity;
        self.len = (self.len + tail.len()).min(capacity);
    }

    /// Returns the contents oldest-first, wrapping once across the physical end.
    pub fn snapshot(&self) -> Vec<f32> {
        let capacity = self.capacity();
        if self.len == 0 {
            return Vec::new();
        }

        let start = (self.write_pos + capacity - self.len) % capacity;
        if start + self.len <= capacity {
            return self.data[start..start + self.len].to_vec();
        }

        let mut out = Vec::with_capacity(self.len);
        out.extend_from_slice(&self.data[start..]);
        out.extend_from_slice(&self.data[..self.len - (capacity - start)]);
        out
    }

    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
        self.total_pushed = 0;
    }
}

/// Locks a shared ring, recovering the data if a holder panicked.
pub fn lock_ring(ring: &SharedRing) -> MutexGuard<'_, SampleRing> {
    ring.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, count: usize) -> Vec<f32> {
        (start..start + count).map(|v| v as f32).collect()
    }

    #[test]
    fn test_empty_snapshot() {
        let ring = SampleRing::with_capacity(8);
        assert!(ring.snapshot().is_empty());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_partial_fill_keeps_order() {
        let mut ring = SampleRing::with_capacity(8);
        ring.push(&ramp(0, 3));
        ring.push(&ramp(3, 2));
        assert_eq!(ring.snapshot(), ramp(0, 5));
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn test_wraparound_snapshot_is_chronological() {
        let mut ring = SampleRing::with_capacity(8);
        ring.push(&ramp(0, 6));
        ring.push(&ramp(6, 5));
        // 11 pushed, newest 8 are 3..11 and straddle the physical end
        assert_eq!(ring.snapshot(), ramp(3, 8));
        assert_eq!(ring.len(), 8);
    }

    #[test]
    fn test_oversized_push_keeps_newest_tail() {
        let mut ring = SampleRing::with_capacity(4);
        ring.push(&ramp(0, 3));
        ring.push(&ramp(3, 10));
        assert_eq!(ring.snapshot(), ramp(9, 4));
        assert_eq!(ring.total_pushed(), 13);
    }

    #[test]
    fn test_snapshot_matches_newest_samples_for_many_push_patterns() {
        let sizes = [1usize, 3, 7, 2, 9, 5, 11, 4, 6, 1, 13];
        for capacity in [1usize, 5, 8, 16] {
            let mut ring = SampleRing::with_capacity(capacity);
            let mut all = Vec::new();
            for &size in &sizes {
                let chunk = ramp(all.len(), size);
                ring.push(&chunk);
                all.extend_from_slice(&chunk);

                let expected_len = capacity.min(all.len());
                let snapshot = ring.snapshot();
                assert_eq!(snapshot.len(), expected_len);
                assert_eq!(snapshot, all[all.len() - expected_len..].to_vec());
            }
        }
    }

    #[test]
    fn test_clear_resets_fill() {
        let mut ring = SampleRing::with_capacity(4);
        ring.push(&ramp(0, 4));
        ring.clear();
        assert!(ring.snapshot().is_empty());
        ring.push(&ramp(10, 2));
        assert_eq!(ring.snapshot(), ramp(10, 2));
    }

    #[test]
    fn test_window_capacity() {
        let ring = SampleRing::for_window(48_000, 5.0);
        assert_eq!(ring.capacity(), 240_000);
    }

    #[test]
    fn test_zero_capacity_ignores_pushes() {
        let mut ring = SampleRing::with_capacity(0);
        ring.push(&ramp(0, 4));
        assert!(ring.snapshot().is_empty());
        assert_eq!(ring.total_pushed(), 4);
    }
}
