//! Error conditions raised by the streaming pipeline.
//!
//! Command handlers work with `anyhow::Error`; the pipeline keeps a typed enum so
//! callers can tell a droppable frame apart from a fatal device failure.

use thiserror::Error;

/// Failures surfaced by the ingestion, playback and connection layers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Payload length is not a whole number of 32-bit samples.
    #[error("malformed frame: {len} bytes is not a multiple of the 4-byte sample width")]
    MalformedFrame { len: usize },

    /// The audio output device could not be found, configured or started.
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),

    /// The inbound stream could not be opened or failed mid-read.
    #[error("stream connection failed: {0}")]
    Connection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_condition() {
        let err = PipelineError::MalformedFrame { len: 10 };
        assert!(err.to_string().contains("10 bytes"));
    }
}
