//! Inbound side of the pipeline: connection, decoding, history and metering.

pub mod connection;
pub mod decoder;
pub mod level;
pub mod ring_buffer;
pub mod stats;

pub use connection::{Backoff, StreamConnection};
pub use decoder::{decode_frame, AudioFrame};
pub use level::{LevelMeter, LevelState};
pub use ring_buffer::{lock_ring, SampleRing, SharedRing};
pub use stats::{lock_stats, SharedStats, StreamStats};
