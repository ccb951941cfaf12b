//! Streaming pipeline lifecycle.
//!
//! `Pipeline::start` opens the output device and spawns the ingestion task,
//! which owns the WebSocket connection and drives an [`Ingestor`] per message.
//! The caller keeps the returned [`Refresher`] and ticks it from its redraw loop.
//! The two sides share only ring buffers, stats and watch channels.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{AirwaveConfig, ReconnectConfig};
use crate::error::PipelineError;
use crate::playback::{AudioSink, MuteFlag, OutputDevice, PlaybackScheduler, ScheduledSegment};
use crate::stream::{
    decode_frame, lock_ring, lock_stats, Backoff, LevelMeter, LevelState, SampleRing, SharedRing,
    SharedStats, StreamConnection, StreamStats,
};
use crate::visualizations::{
    axis_ticks, AxisTick, FftAnalyzer, SpectrogramRaster, SpectrumAnalyzer, WaveformExporter,
    WaveformSegment,
};

/// Longest wait for scheduled audio to drain on stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the ingestion task is in its connect/read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Streaming,
    /// Waiting before reconnect attempt `attempt`
    Reconnecting { attempt: u32 },
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "live"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting ({attempt})"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Read-only views of pipeline state for the UI.
#[derive(Clone)]
pub struct PipelineHandles {
    pub level: watch::Receiver<LevelState>,
    pub state: watch::Receiver<ConnectionState>,
    pub stats: SharedStats,
}

/// Per-message core of the ingestion path: decode, schedule, record, measure.
pub struct Ingestor<S: AudioSink> {
    sample_rate: u32,
    scheduler: PlaybackScheduler<S>,
    ring: SharedRing,
    tap: SharedRing,
    meter: LevelMeter,
    level: watch::Sender<LevelState>,
    stats: SharedStats,
    epoch: Arc<AtomicU64>,
}

impl<S: AudioSink> Ingestor<S> {
    /// Handles one binary message.
    ///
    /// A malformed payload is counted and dropped without touching the cursor,
    /// the buffers or the level.
    pub fn ingest(
        &mut self,
        payload: &[u8],
        arrived: Instant,
    ) -> Result<ScheduledSegment, PipelineError> {
        lock_stats(&self.stats).record_arrival(arrived);

        let frame = match decode_frame(payload, self.sample_rate) {
            Ok(frame) => frame,
            Err(e) => {
                lock_stats(&self.stats).record_malformed();
                return Err(e);
            }
        };

        let segment = self.scheduler.schedule(&frame);
        lock_ring(&self.ring).push(frame.samples());
        self.level.send_replace(self.meter.measure(&frame));
        lock_stats(&self.stats).record_frame(frame.len(), segment.resnapped);
        Ok(segment)
    }

    /// Discards history after a reconnect. The raster is cleared by the refresher.
    pub fn reset(&mut self) {
        lock_ring(&self.ring).clear();
        lock_ring(&self.tap).clear();
        self.level.send_replace(LevelState::SILENT);
        {
            let mut stats = lock_stats(&self.stats);
            stats.reset_arrivals();
            stats.reconnects += 1;
        }
        self.epoch.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the stream as stalled: the analyzer tap and level fall silent,
    /// the waveform ring keeps its history.
    pub fn stall(&mut self) {
        lock_ring(&self.tap).clear();
        self.level.send_replace(LevelState::SILENT);
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<S> {
        &self.scheduler
    }

    pub fn ring(&self) -> &SharedRing {
        &self.ring
    }
}

/// Per-tick core of the visual path.
pub struct Refresher<A: SpectrumAnalyzer> {
    analyzer: A,
    raster: SpectrogramRaster,
    exporter: WaveformExporter,
    tap: SharedRing,
    ring: SharedRing,
    epoch: Arc<AtomicU64>,
    seen_epoch: u64,
    axis_tick_count: usize,
}

impl<A: SpectrumAnalyzer> Refresher<A> {
    /// Advances the spectrogram by one column and returns a waveform snapshot
    /// when the export throttle allows one.
    pub fn tick(&mut self, now: Instant) -> Option<WaveformSegment> {
        let epoch = self.epoch.load(Ordering::Relaxed);
        if epoch != self.seen_epoch {
            self.seen_epoch = epoch;
            self.raster.clear();
            self.analyzer.reset();
            self.exporter.invalidate();
        }

        let window = lock_ring(&self.tap).snapshot();
        let bins = self.analyzer.analyze(&window);
        self.raster.tick(bins);
        self.exporter.poll(now, &self.ring)
    }

    /// Resizes the spectrogram; a changed size discards its history.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.raster.resize(width, height);
    }

    pub fn raster(&self) -> &SpectrogramRaster {
        &self.raster
    }

    pub fn axis(&self) -> Vec<AxisTick> {
        axis_ticks(
            self.raster.scale(),
            self.analyzer.nyquist(),
            self.analyzer.bin_count(),
            self.axis_tick_count,
        )
    }
}

/// Builds the connected ingestion and refresh halves around `sink`.
pub fn wire<S: AudioSink>(
    sink: S,
    mute: MuteFlag,
    config: &AirwaveConfig,
) -> (Ingestor<S>, Refresher<FftAnalyzer>, PipelineHandles) {
    let sample_rate = config.stream.sample_rate;
    let visuals = &config.visuals;

    let ring = SampleRing::shared_window(sample_rate, visuals.history_seconds);
    let tap = SampleRing::shared(visuals.fft_size);
    let stats = StreamStats::shared();
    let epoch = Arc::new(AtomicU64::new(0));
    let (level_tx, level_rx) = watch::channel(LevelState::SILENT);
    // Replaced by the ingestion task once it starts
    let (_, state_rx) = watch::channel(ConnectionState::Connecting);

    let scheduler =
        PlaybackScheduler::new(sink, config.playback.lead_time(), mute).with_tap(tap.clone());

    let ingestor = Ingestor {
        sample_rate,
        scheduler,
        ring: ring.clone(),
        tap: tap.clone(),
        meter: LevelMeter::new(visuals.level_scale),
        level: level_tx,
        stats: stats.clone(),
        epoch: epoch.clone(),
    };

    let refresher = Refresher {
        analyzer: FftAnalyzer::new(sample_rate, visuals.analyzer()),
        raster: SpectrogramRaster::new(0, 0, visuals.frequency_scale),
        exporter: WaveformExporter::new(visuals.waveform_interval()),
        tap,
        ring,
        epoch,
        seen_epoch: 0,
        axis_tick_count: visuals.axis_ticks,
    };

    let handles = PipelineHandles {
        level: level_rx,
        state: state_rx,
        stats,
    };

    (ingestor, refresher, handles)
}

/// Running pipeline: output device plus the ingestion task.
///
/// Holds the cpal stream, so it stays on the task that started it.
pub struct Pipeline {
    output: Option<OutputDevice>,
    task: Option<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    url: String,
}

impl Pipeline {
    /// Opens the output device and starts streaming from `config.stream.url`.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// - `OutputUnavailable` if the output device cannot be opened
    pub fn start(
        config: &AirwaveConfig,
        mute: MuteFlag,
    ) -> Result<(Self, Refresher<FftAnalyzer>, PipelineHandles), PipelineError> {
        let output = OutputDevice::open(&config.playback.device, config.stream.sample_rate)?;
        let (ingestor, refresher, mut handles) = wire(output.sink(), mute, config);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        handles.state = state_rx;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let url = config.stream.url.clone();
        let task = tokio::spawn(run_ingestion(
            ingestor,
            url.clone(),
            config.stream.reconnect.clone(),
            state_tx,
            shutdown_rx,
        ));

        tracing::info!(
            "Pipeline started: {} at {}Hz on {}",
            url,
            config.stream.sample_rate,
            output.device_name()
        );

        let pipeline = Self {
            output: Some(output),
            task: Some(task),
            shutdown: shutdown_tx,
            url,
        };
        Ok((pipeline, refresher, handles))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn device_name(&self) -> Option<&str> {
        self.output.as_ref().map(OutputDevice::device_name)
    }

    /// Stops the ingestion task, then lets already-scheduled audio play out.
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Ingestion task ended abnormally: {}", e);
            }
        }
        if let Some(output) = self.output.take() {
            output.finish(DRAIN_TIMEOUT).await;
        }
        tracing::info!("Pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!("Pipeline dropped while running, aborting ingestion");
            task.abort();
        }
    }
}

/// Connect, read and reconnect until shutdown or the reconnect policy gives up.
async fn run_ingestion<S: AudioSink>(
    mut ingestor: Ingestor<S>,
    url: String,
    reconnect: ReconnectConfig,
    state: watch::Sender<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(reconnect);
    let mut delivered_before = false;

    'session: loop {
        if *shutdown.borrow() {
            break;
        }
        state.send_replace(ConnectionState::Connecting);

        let connected = tokio::select! {
            _ = shutdown.changed() => break 'session,
            result = StreamConnection::connect(&url) => result,
        };

        match connected {
            Ok(mut connection) => {
                state.send_replace(ConnectionState::Streaming);
                let mut delivered = false;

                let stopping = loop {
                    tokio::select! {
                        _ = shutdown.changed() => break true,
                        payload = connection.next_payload() => match payload {
                            Some(payload) => {
                                // Only a connection that carries data counts as recovered
                                if !delivered {
                                    if delivered_before {
                                        tracing::info!("Reconnected, discarding buffered history");
                                        ingestor.reset();
                                    }
                                    delivered = true;
                                    delivered_before = true;
                                    backoff.reset();
                                }
                                if let Err(e) = ingestor.ingest(&payload, Instant::now()) {
                                    tracing::debug!("Dropped frame: {}", e);
                                }
                            }
                            None => {
                                ingestor.stall();
                                break false;
                            }
                        },
                    }
                };

                connection.close().await;
                if stopping {
                    break;
                }
            }
            Err(e) => tracing::warn!("{}", e),
        }

        let Some(delay) = backoff.next_delay() else {
            tracing::info!("Stream ended, not reconnecting");
            break;
        };
        tracing::info!(
            "Reconnect attempt {} in {}ms",
            backoff.attempt(),
            delay.as_millis()
        );
        state.send_replace(ConnectionState::Reconnecting {
            attempt: backoff.attempt(),
        });

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    state.send_replace(ConnectionState::Closed);
}
