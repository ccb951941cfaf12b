//! Playback side of the pipeline: audio-clock scheduling and the output device.

pub mod output;
pub mod scheduler;

pub use output::{DeviceSink, OutputDevice};
pub use scheduler::{mute_flag, AudioSink, MuteFlag, PlaybackScheduler, ScheduledSegment};
