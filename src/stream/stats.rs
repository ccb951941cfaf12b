//! Ingestion counters and arrival-interval tracking for the status footer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Number of inter-arrival intervals averaged for the lag readout.
const INTERVAL_WINDOW: usize = 50;

/// Stats shared between the ingestion task and the UI.
pub type SharedStats = Arc<Mutex<StreamStats>>;

#[derive(Debug, Default, Clone)]
pub struct StreamStats {
    pub frames: u64,
    pub samples: u64,
    pub malformed: u64,
    pub resnaps: u64,
    pub reconnects: u64,
    last_arrival: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl StreamStats {
    pub fn shared() -> SharedStats {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Records the arrival time of any message, valid or not.
    pub fn record_arrival(&mut self, now: Instant) {
        if let Some(last) = self.last_arrival {
            self.intervals.push_back(now.saturating_duration_since(last));
            if self.intervals.len() > INTERVAL_WINDOW {
                self.intervals.pop_front();
            }
        }
        self.last_arrival = Some(now);
    }

    pub fn record_frame(&mut self, sample_count: usize, resnapped: bool) {
        self.frames += 1;
        self.samples += sample_count as u64;
        if resnapped {
            self.resnaps += 1;
        }
    }

    pub fn record_malformed(&mut self) {
        self.malformed += 1;
    }

    /// Mean interval between recent messages, if at least two have arrived.
    pub fn mean_interval(&self) -> Option<Duration> {
        if self.intervals.is_empty() {
            return None;
        }
        let total: Duration = self.intervals.iter().sum();
        Some(total / self.intervals.len() as u32)
    }

    /// Forgets arrival history after a reconnect so the lag does not span the outage.
    pub fn reset_arrivals(&mut self) {
        self.last_arrival = None;
        self.intervals.clear();
    }
}

pub fn lock_stats(stats: &SharedStats) -> MutexGuard<'_, StreamStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}
