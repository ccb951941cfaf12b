//! Gapless playback scheduling on the audio output clock.
//!
//! The scheduler owns the playback cursor: the audio-clock instant at which the
//! previously scheduled frame ends. Each frame starts at
//! `max(cursor, now + lead_time)`, so segments never overlap, and a frame that
//! arrives after a stall snaps forward instead of building a backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::stream::{lock_ring, AudioFrame, SharedRing};

/// Whether output is audible. Owned by the UI, read once per scheduled frame.
pub type MuteFlag = Arc<AtomicBool>;

/// Creates a mute flag with the given initial state.
pub fn mute_flag(muted: bool) -> MuteFlag {
    Arc::new(AtomicBool::new(muted))
}

/// Destination of scheduled audio, exposing the audio clock it plays against.
pub trait AudioSink: Send {
    /// Current audio-clock time in seconds.
    fn now(&self) -> f64;

    /// Queues `samples` to play at `segment.start`, multiplied by `segment.gain`.
    fn enqueue(&mut self, segment: &ScheduledSegment, samples: &[f32]);
}

/// Placement of one frame on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    /// Start time in seconds on the audio clock
    pub start: f64,
    /// Playback length in seconds
    pub duration: f64,
    /// Output gain, 0.0 while muted
    pub gain: f32,
    /// Start was pushed forward past the cursor because the frame arrived late
    pub resnapped: bool,
}

impl ScheduledSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

pub struct PlaybackScheduler<S: AudioSink> {
    sink: S,
    lead_time: f64,
    cursor: f64,
    mute: MuteFlag,
    /// Receives un-gained scheduled audio for spectrum analysis
    tap: Option<SharedRing>,
    scheduled: u64,
}

impl<S: AudioSink> PlaybackScheduler<S> {
    /// Creates a scheduler whose cursor starts one lead time ahead of the sink clock.
    pub fn new(sink: S, lead_time: Duration, mute: MuteFlag) -> Self {
        let lead_time = lead_time.as_secs_f64();
        let cursor = sink.now() + lead_time;
        Self {
            sink,
            lead_time,
            cursor,
            mute,
            tap: None,
            scheduled: 0,
        }
    }

    /// Forwards every scheduled frame to `tap` before gain is applied.
    pub fn with_tap(mut self, tap: SharedRing) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Next free instant on the audio clock.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Places `frame` on the audio clock and hands it to the sink.
    pub fn schedule(&mut self, frame: &AudioFrame) -> ScheduledSegment {
        let earliest = self.sink.now() + self.lead_time;
        let resnapped = self.scheduled > 0 && earliest > self.cursor;
        let start = self.cursor.max(earliest);

        let gain = if self.mute.load(Ordering::Relaxed) {
            0.0
        } else {
            1.0
        };

        let segment = ScheduledSegment {
            start,
            duration: frame.duration_secs(),
            gain,
            resnapped,
        };

        if resnapped {
            tracing::debug!(
                "Late frame: cursor {:.3}s behind clock, re-snapped to {:.3}s",
                earliest - self.cursor,
                start
            );
        }

        if !frame.is_empty() {
            self.sink.enqueue(&segment, frame.samples());
            if let Some(tap) = &self.tap {
                lock_ring(tap).push(frame.samples());
            }
        }

        self.cursor = segment.end();
        self.scheduled += 1;
        segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::testing::ManualSink;
    use crate::stream::SampleRing;

    const LEAD: Duration = Duration::from_millis(50);

    fn frame(len: usize) -> AudioFrame {
        AudioFrame::new(vec![0.1; len], 48_000)
    }

    #[test]
    fn test_cursor_starts_one_lead_ahead() {
        let sink = ManualSink::at(2.0);
        let scheduler = PlaybackScheduler::new(sink, LEAD, mute_flag(false));
        assert!((scheduler.cursor() - 2.05).abs() < 1e-12);
    }

    #[test]
    fn test_back_to_back_frames_are_contiguous() {
        let sink = ManualSink::at(0.0);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), LEAD, mute_flag(false));

        let first = scheduler.schedule(&frame(960));
        let second = scheduler.schedule(&frame(480));
        assert!((first.start - 0.05).abs() < 1e-12);
        assert!((second.start - first.end()).abs() < 1e-12);
        assert!(!second.resnapped);
        assert_eq!(sink.segments().len(), 2);
    }

    #[test]
    fn test_segments_never_overlap_under_jittery_clock() {
        let sink = ManualSink::at(0.0);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), LEAD, mute_flag(false));

        // Clock advances irregularly: sometimes faster than audio, sometimes slower
        let advances = [0.0, 0.01, 0.05, 0.0, 0.2, 0.02, 0.0, 0.0, 1.5, 0.019];
        for (i, advance) in advances.iter().enumerate() {
            sink.advance(*advance);
            scheduler.schedule(&frame(480 + i * 37));
        }

        let segments = sink.segments();
        for pair in segments.windows(2) {
            assert!(pair[1].0.start >= pair[0].0.end() - 1e-12);
        }
    }

    #[test]
    fn test_late_frame_resnaps_to_now_plus_lead() {
        let sink = ManualSink::at(0.0);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), LEAD, mute_flag(false));

        scheduler.schedule(&frame(960));
        sink.advance(5.0);
        let late = scheduler.schedule(&frame(960));

        assert!(late.resnapped);
        assert!((late.start - 5.05).abs() < 1e-9);
        assert!((scheduler.cursor() - 5.07).abs() < 1e-9);
    }

    #[test]
    fn test_mute_sets_zero_gain_but_still_schedules() {
        let sink = ManualSink::at(0.0);
        let mute = mute_flag(true);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), LEAD, mute.clone());

        let muted = scheduler.schedule(&frame(960));
        mute.store(false, Ordering::Relaxed);
        let audible = scheduler.schedule(&frame(960));

        assert_eq!(muted.gain, 0.0);
        assert_eq!(audible.gain, 1.0);
        assert_eq!(sink.segments().len(), 2);
    }

    #[test]
    fn test_tap_receives_ungained_samples() {
        let sink = ManualSink::at(0.0);
        let tap = SampleRing::shared(16);
        let mut scheduler =
            PlaybackScheduler::new(sink, LEAD, mute_flag(true)).with_tap(tap.clone());

        scheduler.schedule(&AudioFrame::new(vec![0.5, -0.5], 48_000));
        assert_eq!(lock_ring(&tap).snapshot(), vec![0.5, -0.5]);
    }

    #[test]
    fn test_empty_frame_does_not_reach_sink() {
        let sink = ManualSink::at(0.0);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), LEAD, mute_flag(false));
        let segment = scheduler.schedule(&frame(0));
        assert_eq!(segment.duration, 0.0);
        assert!(sink.segments().is_empty());
    }
}
