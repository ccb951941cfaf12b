//! Scrolling spectrogram raster.
//!
//! Each refresh tick appends one column of magnitudes at the right edge and
//! evicts the leftmost once the raster is full, giving a continuous left scroll.
//! Resizing discards history rather than redrawing it.

use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How raster rows map onto analyzer bins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyScale {
    /// Bin 0 at the bottom row, highest bin at the top, evenly spaced
    #[default]
    Linear,
    /// Logarithmic spacing, giving more rows to low frequencies
    Log,
}

impl std::fmt::Display for FrequencyScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Log => write!(f, "log"),
        }
    }
}

impl FrequencyScale {
    /// Bin shown at vertical `position` in [0, 1], 0 being the bottom.
    fn bin_at(self, position: f32, bin_count: usize) -> usize {
        if bin_count == 0 {
            return 0;
        }
        let bin = match self {
            Self::Linear => position * (bin_count - 1) as f32,
            Self::Log => (bin_count as f32).powf(position) - 1.0,
        };
        (bin.round() as usize).min(bin_count - 1)
    }

    /// Bin shown at `row` (0 = bottom) of a raster `height` rows tall.
    pub fn bin_for_row(self, row: usize, height: usize, bin_count: usize) -> usize {
        let position = if height > 1 {
            row as f32 / (height - 1) as f32
        } else {
            0.0
        };
        self.bin_at(position, bin_count)
    }

    /// Frequency shown at vertical `position` in [0, 1].
    pub fn frequency_at(self, position: f32, nyquist: f32, bin_count: usize) -> f32 {
        match self {
            Self::Linear => position * nyquist,
            Self::Log if bin_count > 0 => {
                self.bin_at(position, bin_count) as f32 / bin_count as f32 * nyquist
            }
            Self::Log => 0.0,
        }
    }
}

/// Fixed-size 2-D magnitude history, newest column at the trailing edge.
#[derive(Debug, Clone)]
pub struct SpectrogramRaster {
    width: usize,
    height: usize,
    scale: FrequencyScale,
    /// Oldest column first; each column is `height` cells, bottom row first
    columns: VecDeque<Vec<u8>>,
}

impl SpectrogramRaster {
    pub fn new(width: usize, height: usize, scale: FrequencyScale) -> Self {
        Self {
            width,
            height,
            scale,
            columns: VecDeque::with_capacity(width),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn scale(&self) -> FrequencyScale {
        self.scale
    }

    /// Number of columns holding history.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Appends one column built from `bins`, evicting the oldest when full.
    pub fn tick(&mut self, bins: &[u8]) {
        if self.width == 0 || self.height == 0 {
            return;
        }

        let column = (0..self.height)
            .map(|row| {
                let bin = self.scale.bin_for_row(row, self.height, bins.len());
                bins.get(bin).copied().unwrap_or(0)
            })
            .collect();

        if self.columns.len() == self.width {
            self.columns.pop_front();
        }
        self.columns.push_back(column);
    }

    /// Reallocates at the new size, dropping all history.
    pub fn resize(&mut self, width: usize, height: usize) {
        if width == self.width && height == self.height {
            return;
        }
        tracing::debug!(
            "Spectrogram resized {}x{} -> {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        self.width = width;
        self.height = height;
        self.columns = VecDeque::with_capacity(width);
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }

    /// Columns oldest to newest.
    pub fn columns(&self) -> impl Iterator<Item = &[u8]> {
        self.columns.iter().map(Vec::as_slice)
    }

    /// Value at screen column `x` (0 = left) and `row` (0 = bottom).
    ///
    /// Columns to the left of the oldest retained column are empty.
    pub fn cell(&self, x: usize, row: usize) -> Option<u8> {
        if x >= self.width || row >= self.height {
            return None;
        }
        let offset = self.width - self.columns.len();
        let index = x.checked_sub(offset)?;
        self.columns.get(index).map(|column| column[row])
    }
}

/// Colour for a magnitude: hue sweeps blue → red, lightness grows with magnitude.
pub fn palette(value: u8) -> Color {
    let level = value as f32 / 255.0;
    let hue = 240.0 * (1.0 - level);
    let lightness = 0.5 * level;
    let (r, g, b) = hsl_to_rgb(hue, 1.0, lightness);
    Color::Rgb(r, g, b)
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> (u8, u8, u8) {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let to_byte = |c: f32| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}

/// One frequency label on the spectrogram axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisTick {
    /// Vertical position in [0, 1], 0 at the bottom
    pub fraction: f32,
    pub hz: f32,
    pub label: String,
}

/// Evenly spaced axis ticks from 0 Hz to Nyquist.
pub fn axis_ticks(
    scale: FrequencyScale,
    nyquist: f32,
    bin_count: usize,
    count: usize,
) -> Vec<AxisTick> {
    (0..count)
        .map(|i| {
            let fraction = if count > 1 {
                i as f32 / (count - 1) as f32
            } else {
                0.0
            };
            let hz = scale.frequency_at(fraction, nyquist, bin_count);
            AxisTick {
                fraction,
                hz,
                label: format_hz(hz),
            }
        })
        .collect()
}

/// Short frequency label: "0", "750", "4.8k", "24k".
pub fn format_hz(hz: f32) -> String {
    if hz < 1000.0 {
        return format!("{}", hz.round() as u32);
    }
    let khz = format!("{:.1}", hz / 1000.0);
    format!("{}k", khz.trim_end_matches(".0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(value: u8, bins: usize) -> Vec<u8> {
        vec![value; bins]
    }

    #[test]
    fn test_tick_retains_last_width_columns() {
        let mut raster = SpectrogramRaster::new(4, 3, FrequencyScale::Linear);
        for n in 0..10u8 {
            raster.tick(&column(n, 8));
        }
        let values: Vec<u8> = raster.columns().map(|c| c[0]).collect();
        assert_eq!(values, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_partial_history_sits_at_trailing_edge() {
        let mut raster = SpectrogramRaster::new(5, 2, FrequencyScale::Linear);
        raster.tick(&column(10, 4));
        raster.tick(&column(20, 4));

        assert_eq!(raster.cell(0, 0), None);
        assert_eq!(raster.cell(2, 0), None);
        assert_eq!(raster.cell(3, 0), Some(10));
        assert_eq!(raster.cell(4, 1), Some(20));
    }

    #[test]
    fn test_tick_count_property() {
        for width in [1usize, 3, 7] {
            for ticks in 0..12u8 {
                let mut raster = SpectrogramRaster::new(width, 1, FrequencyScale::Linear);
                for n in 0..ticks {
                    raster.tick(&[n]);
                }
                let kept = (ticks as usize).min(width);
                let values: Vec<u8> = raster.columns().map(|c| c[0]).collect();
                let expected: Vec<u8> = (ticks - kept as u8..ticks).collect();
                assert_eq!(values, expected);
            }
        }
    }

    #[test]
    fn test_linear_mapping_puts_bin_zero_at_bottom() {
        let mut raster = SpectrogramRaster::new(1, 4, FrequencyScale::Linear);
        let bins: Vec<u8> = (0..16).collect();
        raster.tick(&bins);
        let col: Vec<u8> = raster.columns().next().unwrap().to_vec();
        assert_eq!(col[0], 0);
        assert_eq!(col[3], 15);
        assert!(col.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_log_mapping_favours_low_bins() {
        let linear = FrequencyScale::Linear.bin_for_row(2, 5, 1024);
        let log = FrequencyScale::Log.bin_for_row(2, 5, 1024);
        assert!(log < linear);
        assert_eq!(FrequencyScale::Log.bin_for_row(4, 5, 1024), 1023);
    }

    #[test]
    fn test_log_mapping_keeps_dc_on_bottom_row() {
        assert_eq!(FrequencyScale::Log.bin_for_row(0, 5, 1024), 0);
        assert_eq!(FrequencyScale::Log.bin_for_row(0, 4, 2), 0);
        assert_eq!(FrequencyScale::Log.bin_for_row(3, 4, 2), 1);

        let axis = axis_ticks(FrequencyScale::Log, 24_000.0, 1024, 6);
        assert_eq!(axis[0].label, "0");
    }

    #[test]
    fn test_resize_clears_history() {
        let mut raster = SpectrogramRaster::new(4, 2, FrequencyScale::Linear);
        raster.tick(&[1, 2]);
        raster.tick(&[3, 4]);
        raster.resize(6, 3);
        assert!(raster.is_empty());
        assert_eq!(raster.width(), 6);
        assert_eq!(raster.height(), 3);
    }

    #[test]
    fn test_resize_to_same_size_keeps_history() {
        let mut raster = SpectrogramRaster::new(4, 2, FrequencyScale::Linear);
        raster.tick(&[1, 2]);
        raster.resize(4, 2);
        assert_eq!(raster.len(), 1);
    }

    #[test]
    fn test_zero_sized_raster_ignores_ticks() {
        let mut raster = SpectrogramRaster::new(0, 0, FrequencyScale::Linear);
        raster.tick(&[255; 8]);
        assert!(raster.is_empty());
    }

    #[test]
    fn test_palette_sweeps_blue_to_red() {
        assert_eq!(palette(0), Color::Rgb(0, 0, 0));
        match palette(255) {
            Color::Rgb(r, g, b) => assert!(r == 255 && g == 0 && b == 0),
            other => panic!("unexpected colour {other:?}"),
        }
        match palette(40) {
            Color::Rgb(r, _, b) => assert!(b > r),
            other => panic!("unexpected colour {other:?}"),
        }
    }

    #[test]
    fn test_six_axis_ticks_span_zero_to_nyquist() {
        let ticks = axis_ticks(FrequencyScale::Linear, 24_000.0, 1024, 6);
        let labels: Vec<&str> = ticks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["0", "4.8k", "9.6k", "14.4k", "19.2k", "24k"]);
        assert_eq!(ticks[0].fraction, 0.0);
        assert_eq!(ticks[5].fraction, 1.0);
    }

    #[test]
    fn test_format_hz() {
        assert_eq!(format_hz(0.0), "0");
        assert_eq!(format_hz(750.0), "750");
        assert_eq!(format_hz(1000.0), "1k");
        assert_eq!(format_hz(12_345.0), "12.3k");
    }
}
