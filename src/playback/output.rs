//! Audio output device and the clock scheduled segments play against.
//!
//! Segments are positioned in absolute output frames. The device callback writes
//! whichever segment covers each frame (scaled by its gain) and silence
//! elsewhere, then advances the frame counter that serves as the audio clock.

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::scheduler::{AudioSink, ScheduledSegment};
use crate::error::PipelineError;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

struct QueuedSegment {
    start_frame: u64,
    samples: Vec<f32>,
    gain: f32,
}

impl QueuedSegment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

#[derive(Default)]
struct OutputQueue {
    segments: VecDeque<QueuedSegment>,
    /// End frame of the newest queued segment
    last_end: u64,
}

impl OutputQueue {
    /// Fills `out` (interleaved, `channels` wide) starting at absolute frame `first_frame`.
    fn render(&mut self, first_frame: u64, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let position = first_frame + i as u64;

            while self
                .segments
                .front()
                .is_some_and(|segment| segment.end_frame() <= position)
            {
                self.segments.pop_front();
            }

            let value = match self.segments.front() {
                Some(segment) if segment.start_frame <= position => {
                    segment.samples[(position - segment.start_frame) as usize] * segment.gain
                }
                _ => 0.0,
            };
            frame.fill(value);
        }
    }
}

/// `Send` handle the scheduler uses to queue audio and read the clock.
#[derive(Clone)]
pub struct DeviceSink {
    queue: Arc<Mutex<OutputQueue>>,
    frames_played: Arc<AtomicU64>,
    sample_rate: u32,
}

impl DeviceSink {
    fn new(sample_rate: u32) -> Self {
        Self {
            queue: Arc::new(Mutex::new(OutputQueue::default())),
            frames_played: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, OutputQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether any queued audio has yet to be played.
    pub fn pending(&self) -> bool {
        let played = self.frames_played.load(Ordering::Relaxed);
        self.lock_queue()
            .segments
            .back()
            .is_some_and(|segment| segment.end_frame() > played)
    }

    fn render(&self, out: &mut [f32], channels: usize) {
        let first_frame = self.frames_played.load(Ordering::Relaxed);
        self.lock_queue().render(first_frame, out, channels);
        let frames = out.len() / channels.max(1);
        self.frames_played.fetch_add(frames as u64, Ordering::Relaxed);
    }
}

impl AudioSink for DeviceSink {
    fn now(&self) -> f64 {
        self.frames_played.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn enqueue(&mut self, segment: &ScheduledSegment, samples: &[f32]) {
        let requested = (segment.start * self.sample_rate as f64).round().max(0.0) as u64;
        let mut queue = self.lock_queue();
        // Rounding to whole frames must not pull a segment into its predecessor
        let start_frame = requested.max(queue.last_end);
        queue.last_end = start_frame + samples.len() as u64;
        queue.segments.push_back(QueuedSegment {
            start_frame,
            samples: samples.to_vec(),
            gain: segment.gain,
        });
    }
}

/// Open cpal output stream. Must stay on the thread that opened it.
pub struct OutputDevice {
    stream: cpal::Stream,
    sink: DeviceSink,
    device_name: String,
}

impl OutputDevice {
    /// Opens `device_spec` ("default", an index or a name) at the stream sample rate.
    ///
    /// # Errors
    /// - `OutputUnavailable` if the device cannot be found, configured or started
    pub fn open(device_spec: &str, sample_rate: u32) -> Result<Self, PipelineError> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if device_spec == "default" {
                host.default_output_device()
                    .ok_or_else(|| anyhow!("No audio output device available"))
            } else {
                find_device_by_name(&host, device_spec)
            }
        })
        .map_err(|e| PipelineError::OutputUnavailable(e.to_string()))?;

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Playback device: {}", device_name);

        let default_config = device
            .default_output_config()
            .map_err(|e| PipelineError::OutputUnavailable(format!("{device_name}: {e}")))?;
        let channels = default_config.channels();

        if default_config.sample_rate().0 != sample_rate {
            tracing::warn!(
                "Device default rate is {}Hz; requesting stream rate {}Hz",
                default_config.sample_rate().0,
                sample_rate
            );
        }

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let sink = DeviceSink::new(sample_rate);
        let callback_sink = sink.clone();
        let callback_channels = channels as usize;

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_sink.render(data, callback_channels);
                },
                |err| {
                    tracing::error!("Output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PipelineError::OutputUnavailable(format!("{device_name}: {e}")))?;

        stream
            .play()
            .map_err(|e| PipelineError::OutputUnavailable(format!("{device_name}: {e}")))?;

        tracing::debug!(
            "Output stream started: {}Hz, {} channels",
            sample_rate,
            channels
        );

        Ok(Self {
            stream,
            sink,
            device_name,
        })
    }

    pub fn sink(&self) -> DeviceSink {
        self.sink.clone()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Lets already-scheduled audio play out, then closes the stream.
    pub async fn finish(self, max_wait: Duration) {
        let started = Instant::now();
        while self.sink.pending() && started.elapsed() < max_wait {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if let Err(e) = self.stream.pause() {
            tracing::debug!("Failed to pause output stream: {}", e);
        }
        tracing::debug!("Output stream closed");
    }
}

/// Finds an audio output device by name or numeric index.
///
/// # Errors
/// - If no device with the specified name/index is found
fn find_device_by_name(host: &cpal::Host, device_spec: &str) -> anyhow::Result<cpal::Device> {
    let devices: Vec<_> = host
        .output_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?
        .collect();

    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            anyhow!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            )
        });
    }

    devices
        .into_iter()
        .find(|device| device.name().is_ok_and(|name| name == device_spec))
        .ok_or_else(|| {
            anyhow!(
                "Audio output device '{device_spec}' not found. Use 'airwave list-devices' to see available devices."
            )
        })
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// On non-Linux platforms, no stderr suppression is needed since ALSA doesn't exist.
#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, gain: f32) -> ScheduledSegment {
        ScheduledSegment {
            start,
            duration: 0.0,
            gain,
            resnapped: false,
        }
    }

    #[test]
    fn test_render_places_segment_at_start_frame() {
        let mut sink = DeviceSink::new(10);
        sink.enqueue(&segment(0.2, 1.0), &[1.0, 2.0, 3.0]);

        let mut out = vec![9.0; 6];
        sink.render(&mut out, 1);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 2.0, 3.0, 0.0]);
        assert!((sink.now() - 0.6).abs() < 1e-12);
        assert!(!sink.pending());
    }

    #[test]
    fn test_render_duplicates_mono_across_channels_and_applies_gain() {
        let mut sink = DeviceSink::new(10);
        sink.enqueue(&segment(0.0, 0.5), &[1.0, -1.0]);

        let mut out = vec![0.0; 4];
        sink.render(&mut out, 2);
        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_muted_segment_renders_silence() {
        let mut sink = DeviceSink::new(10);
        sink.enqueue(&segment(0.0, 0.0), &[1.0, 1.0]);

        let mut out = vec![7.0; 2];
        sink.render(&mut out, 1);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rounding_never_overlaps_previous_segment() {
        let mut sink = DeviceSink::new(10);
        sink.enqueue(&segment(0.0, 1.0), &[1.0, 1.0, 1.0]);
        // 0.26s rounds to frame 3, 0.24s would round to frame 2 and overlap
        sink.enqueue(&segment(0.24, 1.0), &[2.0]);

        let mut out = vec![0.0; 5];
        sink.render(&mut out, 1);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_pending_until_played() {
        let mut sink = DeviceSink::new(10);
        sink.enqueue(&segment(0.0, 1.0), &[1.0; 4]);
        assert!(sink.pending());

        let mut out = vec![0.0; 2];
        sink.render(&mut out, 1);
        assert!(sink.pending());
        sink.render(&mut out, 1);
        assert!(!sink.pending());
    }
}
