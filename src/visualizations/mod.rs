//! Visual refresh side of the pipeline.
//!
//! Each module turns pipeline state into something the terminal view can draw:
//! spectrum analysis, the scrolling spectrogram and the throttled waveform.

pub mod spectrogram;
pub mod spectrum;
pub mod waveform;

pub use spectrogram::{axis_ticks, palette, AxisTick, FrequencyScale, SpectrogramRaster};
pub use spectrum::{AnalyzerConfig, FftAnalyzer, SpectrumAnalyzer};
pub use waveform::{WaveformExporter, WaveformSegment};
