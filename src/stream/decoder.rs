//! Decoding of inbound binary messages into audio frames.
//!
//! Every message carries nothing but little-endian 32-bit float mono samples.
//! There is no header, sequence number or timestamp, so arrival order is the
//! only ordering signal.

use crate::error::PipelineError;

/// Width of one encoded sample in bytes.
pub const SAMPLE_WIDTH: usize = 4;

/// One decoded network message.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Interprets a payload as an ordered sequence of f32 samples.
///
/// # Errors
/// - `MalformedFrame` if the payload length is not a multiple of 4 bytes
pub fn decode_frame(payload: &[u8], sample_rate: u32) -> Result<AudioFrame, PipelineError> {
    if payload.len() % SAMPLE_WIDTH != 0 {
        return Err(PipelineError::MalformedFrame { len: payload.len() });
    }

    let samples = payload
        .chunks_exact(SAMPLE_WIDTH)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(AudioFrame::new(samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_preserves_order() {
        let payload = encode(&[0.25, -0.5, 1.0, 0.0]);
        let frame = decode_frame(&payload, 48_000).unwrap();
        assert_eq!(frame.samples(), &[0.25, -0.5, 1.0, 0.0]);
        assert_eq!(frame.sample_rate(), 48_000);
    }

    #[test]
    fn test_decode_rejects_partial_sample() {
        let mut payload = encode(&[0.1, 0.2]);
        payload.push(0xff);
        match decode_frame(&payload, 48_000) {
            Err(PipelineError::MalformedFrame { len }) => assert_eq!(len, 9),
            other => panic!("expected MalformedFrame, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_payload_is_empty_frame() {
        let frame = decode_frame(&[], 48_000).unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.duration_secs(), 0.0);
    }

    #[test]
    fn test_duration_of_twenty_millisecond_frame() {
        let frame = AudioFrame::new(vec![0.0; 960], 48_000);
        assert!((frame.duration_secs() - 0.02).abs() < 1e-12);
    }
}
