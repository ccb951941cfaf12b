//! Terminal view for a live stream: waveform, spectrogram and status footer.
//!
//! The view is redrawn by the listen command on every refresh tick; it reads
//! pipeline state but never writes it, except for the mute toggle the command
//! applies on its behalf.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    buffer::Buffer,
    prelude::*,
    text::{Line, Span},
    widgets::{Paragraph, Sparkline, Widget},
};
use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};

use crate::pipeline::ConnectionState;
use crate::stream::LevelState;
use crate::visualizations::{palette, AxisTick, SpectrogramRaster, WaveformSegment};

/// Columns reserved left of the spectrogram for frequency labels.
const AXIS_GUTTER: u16 = 6;

/// How long the peak readout holds its maximum.
const PEAK_HOLD: Duration = Duration::from_secs(3);

const BACKGROUND: Color = Color::Rgb(0, 0, 0);
const FOREGROUND: Color = Color::Rgb(185, 207, 212);
const QUIET_TINT: (u8, u8, u8) = (206, 224, 220);
const LOUD_TINT: (u8, u8, u8) = (255, 96, 64);

/// User input during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenCommand {
    /// No key or an unbound key
    Continue,
    /// Toggle output mute ('m')
    ToggleMute,
    /// Stop and exit ('q', Escape or Ctrl+C)
    Quit,
}

/// Maps a key press to a command.
pub fn command_for_key(key: KeyEvent) -> ListenCommand {
    if key.kind != KeyEventKind::Press {
        return ListenCommand::Continue;
    }
    match key.code {
        KeyCode::Char('m') => ListenCommand::ToggleMute,
        KeyCode::Char('q') | KeyCode::Esc => ListenCommand::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            ListenCommand::Quit
        }
        _ => ListenCommand::Continue,
    }
}

/// Highest level seen in the last few seconds.
#[derive(Debug, Clone)]
pub struct PeakHold {
    value: f32,
    held_at: Option<Instant>,
    hold: Duration,
}

impl PeakHold {
    pub fn new(hold: Duration) -> Self {
        Self {
            value: 0.0,
            held_at: None,
            hold,
        }
    }

    /// Feeds the current level and returns the held peak.
    pub fn update(&mut self, level: f32, now: Instant) -> f32 {
        let expired = self
            .held_at
            .is_none_or(|held| now.saturating_duration_since(held) >= self.hold);
        if level > self.value || expired {
            self.value = level;
            self.held_at = Some(now);
        }
        self.value
    }
}

/// Everything the footer shows.
#[derive(Debug, Clone)]
pub struct FooterStatus {
    pub state: ConnectionState,
    pub level: LevelState,
    pub muted: bool,
    pub lag: Option<Duration>,
    /// Stream URL and output device
    pub source: String,
}

/// Screen regions for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenLayout {
    pub waveform_upper: Rect,
    pub waveform_lower: Rect,
    pub axis: Rect,
    pub spectrogram: Rect,
    pub footer: Rect,
}

impl ListenLayout {
    /// Waveform on the top third, spectrogram below, one footer row.
    pub fn new(area: Rect) -> Self {
        let [content, footer] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(area);
        let [waveform, lower] =
            Layout::vertical([Constraint::Ratio(1, 3), Constraint::Ratio(2, 3)]).areas(content);
        let [waveform_upper, waveform_lower] =
            Layout::vertical([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)]).areas(waveform);
        let [axis, spectrogram] =
            Layout::horizontal([Constraint::Length(AXIS_GUTTER), Constraint::Min(0)])
                .areas(lower);

        Self {
            waveform_upper,
            waveform_lower,
            axis,
            spectrogram,
            footer,
        }
    }

    /// Raster size that fills the spectrogram area, two raster rows per cell.
    pub fn raster_size(&self) -> (usize, usize) {
        (
            self.spectrogram.width as usize,
            self.spectrogram.height as usize * 2,
        )
    }
}

/// Half-block rendering of a spectrogram raster.
pub struct SpectrogramView<'a> {
    raster: &'a SpectrogramRaster,
}

impl<'a> SpectrogramView<'a> {
    pub fn new(raster: &'a SpectrogramRaster) -> Self {
        Self { raster }
    }
}

impl Widget for SpectrogramView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let rows = (self.raster.height() / 2).min(area.height as usize);
        let columns = self.raster.width().min(area.width as usize);

        for line in 0..rows {
            // Raster row 0 is the bottom; terminal line 0 is the top
            let upper = self.raster.height() - 1 - 2 * line;
            let lower = upper - 1;
            let y = area.y + line as u16;

            for x in 0..columns {
                let top = self.raster.cell(x, upper).unwrap_or(0);
                let bottom = self.raster.cell(x, lower).unwrap_or(0);
                if let Some(cell) = buf.cell_mut((area.x + x as u16, y)) {
                    cell.set_symbol("▀")
                        .set_fg(palette(top))
                        .set_bg(palette(bottom));
                }
            }
        }
    }
}

/// Right-aligned frequency labels for the spectrogram gutter.
pub struct AxisView<'a> {
    ticks: &'a [AxisTick],
}

impl<'a> AxisView<'a> {
    pub fn new(ticks: &'a [AxisTick]) -> Self {
        Self { ticks }
    }
}

impl Widget for AxisView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        let span = (area.height - 1) as f32;
        let style = Style::default().fg(FOREGROUND).bg(BACKGROUND);

        for tick in self.ticks {
            let from_bottom = (tick.fraction * span).round() as u16;
            let y = area.y + area.height - 1 - from_bottom.min(area.height - 1);
            let width = area.width.saturating_sub(1) as usize;
            let label = format!("{:>width$}", tick.label);
            buf.set_stringn(area.x, y, label, width, style);
        }
    }
}

/// Waveform colour, shifting from pale to warm as the level rises.
pub fn level_tint(level: LevelState) -> Color {
    let t = level.value();
    let mix = |quiet: u8, loud: u8| (quiet as f32 + (loud as f32 - quiet as f32) * t).round() as u8;
    Color::Rgb(
        mix(QUIET_TINT.0, LOUD_TINT.0),
        mix(QUIET_TINT.1, LOUD_TINT.1),
        mix(QUIET_TINT.2, LOUD_TINT.2),
    )
}

/// Splits an envelope into upward (positive) and downward (negative) bar heights in 0-100.
fn mirrored_bars(envelope: &[(f32, f32)]) -> (Vec<u64>, Vec<u64>) {
    let scale = |v: f32| (v.abs().min(1.0) * 100.0).round() as u64;
    envelope
        .iter()
        .map(|&(min, max)| (scale(max.max(0.0)), scale(min.min(0.0))))
        .unzip()
}

fn footer_line(status: &FooterStatus, peak: f32) -> Line<'static> {
    let indicator_color = match status.state {
        ConnectionState::Streaming => Color::Green,
        ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => Color::Yellow,
        ConnectionState::Closed => Color::Red,
    };
    let lag = status
        .lag
        .map(|lag| format!("{}ms", lag.as_millis()))
        .unwrap_or_else(|| "--".to_string());
    let mute = if status.muted {
        Span::styled(" MUTED ", Style::default().fg(BACKGROUND).bg(Color::Yellow))
    } else {
        Span::raw("")
    };

    Line::from(vec![
        Span::styled("● ", Style::default().fg(indicator_color)),
        Span::raw(format!("{} / ", status.state)),
        Span::raw(format!("{}% / ", status.level.percent())),
        Span::raw(format!("peak {}% / ", LevelState::new(peak).percent())),
        Span::raw(format!("lag {lag} ")),
        mute,
        Span::styled(
            format!(" {}", status.source),
            Style::default().add_modifier(Modifier::DIM),
        ),
    ])
}

/// Full-screen listen view.
pub struct ListenTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    waveform: WaveformSegment,
    peak: PeakHold,
}

impl ListenTui {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If the terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self {
            terminal,
            waveform: WaveformSegment::default(),
            peak: PeakHold::new(PEAK_HOLD),
        })
    }

    /// Layout for the current terminal size.
    ///
    /// # Errors
    /// - If the terminal size cannot be read
    pub fn layout(&self) -> anyhow::Result<ListenLayout> {
        let size = self.terminal.size()?;
        Ok(ListenLayout::new(Rect::new(0, 0, size.width, size.height)))
    }

    /// Replaces the waveform shown until the next export.
    pub fn set_waveform(&mut self, segment: WaveformSegment) {
        self.waveform = segment;
    }

    /// Draws one frame.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(
        &mut self,
        raster: &SpectrogramRaster,
        axis: &[AxisTick],
        status: &FooterStatus,
    ) -> anyhow::Result<()> {
        let peak = self.peak.update(status.level.value(), Instant::now());
        let waveform = &self.waveform;

        self.terminal.draw(|frame| {
            let layout = ListenLayout::new(frame.area());

            let envelope = waveform.envelope(layout.waveform_upper.width as usize);
            let (upper, lower) = mirrored_bars(&envelope);
            let inverted: Vec<u64> = lower.iter().map(|&v| 100u64.saturating_sub(v)).collect();
            let tint = level_tint(status.level);

            frame.render_widget(
                Sparkline::default()
                    .data(&upper)
                    .max(100)
                    .style(Style::default().bg(BACKGROUND).fg(tint)),
                layout.waveform_upper,
            );
            frame.render_widget(
                Sparkline::default()
                    .data(&inverted)
                    .max(100)
                    .style(Style::default().bg(tint).fg(BACKGROUND)),
                layout.waveform_lower,
            );

            frame.render_widget(AxisView::new(axis), layout.axis);
            frame.render_widget(SpectrogramView::new(raster), layout.spectrogram);

            frame.render_widget(
                Paragraph::new(footer_line(status, peak))
                    .style(Style::default().fg(FOREGROUND).bg(BACKGROUND)),
                layout.footer,
            );
        })?;

        Ok(())
    }

    /// Drains pending terminal events without blocking.
    ///
    /// Returns the first command other than `Continue`.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self) -> anyhow::Result<ListenCommand> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                let command = command_for_key(key);
                if command != ListenCommand::Continue {
                    tracing::debug!("Key {:?}: {:?}", key.code, command);
                    return Ok(command);
                }
            }
        }
        Ok(ListenCommand::Continue)
    }

    /// Leaves the alternate screen and restores the cursor.
    ///
    /// # Errors
    /// - If terminal mode cannot be restored
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ListenTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizations::{axis_ticks, FrequencyScale};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_key_bindings() {
        let none = KeyModifiers::NONE;
        assert_eq!(command_for_key(key(KeyCode::Char('m'), none)), ListenCommand::ToggleMute);
        assert_eq!(command_for_key(key(KeyCode::Char('q'), none)), ListenCommand::Quit);
        assert_eq!(command_for_key(key(KeyCode::Esc, none)), ListenCommand::Quit);
        assert_eq!(
            command_for_key(key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            ListenCommand::Quit
        );
        assert_eq!(command_for_key(key(KeyCode::Char('c'), none)), ListenCommand::Continue);
        assert_eq!(command_for_key(key(KeyCode::Enter, none)), ListenCommand::Continue);
    }

    #[test]
    fn test_key_release_is_ignored() {
        let mut release = key(KeyCode::Char('q'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(command_for_key(release), ListenCommand::Continue);
    }

    #[test]
    fn test_peak_hold_decays_after_three_seconds() {
        let mut peak = PeakHold::new(PEAK_HOLD);
        let t0 = Instant::now();
        assert_eq!(peak.update(0.8, t0), 0.8);
        assert_eq!(peak.update(0.2, t0 + Duration::from_secs(1)), 0.8);
        assert_eq!(peak.update(0.9, t0 + Duration::from_secs(2)), 0.9);
        assert_eq!(peak.update(0.1, t0 + Duration::from_secs(4)), 0.9);
        assert_eq!(peak.update(0.1, t0 + Duration::from_secs(5)), 0.1);
    }

    #[test]
    fn test_layout_reserves_footer_and_gutter() {
        let layout = ListenLayout::new(Rect::new(0, 0, 80, 31));
        assert_eq!(layout.footer, Rect::new(0, 30, 80, 1));
        assert_eq!(layout.axis.width, AXIS_GUTTER);
        assert_eq!(layout.spectrogram.width, 80 - AXIS_GUTTER);
        assert_eq!(layout.spectrogram.height, 20);
        assert_eq!(layout.raster_size(), (74, 40));
    }

    #[test]
    fn test_spectrogram_view_draws_half_blocks() {
        let mut raster = SpectrogramRaster::new(3, 4, FrequencyScale::Linear);
        raster.tick(&[255, 0, 0, 0]);

        let area = Rect::new(0, 0, 3, 2);
        let mut buf = Buffer::empty(area);
        SpectrogramView::new(&raster).render(area, &mut buf);

        // Newest column sits on the right; its bottom raster row is loud
        let cell = &buf[(2, 1)];
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.bg, palette(255));
        assert_eq!(cell.fg, palette(0));
        // Columns with no history stay dark
        assert_eq!(buf[(0, 1)].bg, palette(0));
    }

    #[test]
    fn test_axis_view_places_bounds_at_edges() {
        let ticks = axis_ticks(FrequencyScale::Linear, 24_000.0, 1024, 6);
        let area = Rect::new(0, 0, AXIS_GUTTER, 11);
        let mut buf = Buffer::empty(area);
        AxisView::new(&ticks).render(area, &mut buf);

        let row = |y: u16| -> String {
            (0..AXIS_GUTTER).map(|x| buf[(x, y)].symbol().to_string()).collect()
        };
        assert_eq!(row(0).trim(), "24k");
        assert_eq!(row(10).trim(), "0");
    }

    #[test]
    fn test_mirrored_bars_split_envelope() {
        let (upper, lower) = mirrored_bars(&[(-0.5, 0.25), (0.1, 0.2), (-2.0, -0.1)]);
        assert_eq!(upper, vec![25, 20, 0]);
        assert_eq!(lower, vec![50, 0, 100]);
    }

    #[test]
    fn test_level_tint_endpoints() {
        assert_eq!(level_tint(LevelState::SILENT), Color::Rgb(206, 224, 220));
        assert_eq!(level_tint(LevelState::new(1.0)), Color::Rgb(255, 96, 64));
    }

    #[test]
    fn test_footer_names_stream_and_device() {
        let status = FooterStatus {
            state: ConnectionState::Reconnecting { attempt: 2 },
            level: LevelState::new(0.5),
            muted: true,
            lag: Some(Duration::from_millis(20)),
            source: "ws://radio:8000/ws/audio on Speakers".to_string(),
        };
        let text: String = footer_line(&status, 0.75)
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect();

        assert!(text.contains("reconnecting (2)"));
        assert!(text.contains("peak 75%"));
        assert!(text.contains("lag 20ms"));
        assert!(text.contains("MUTED"));
        assert!(text.ends_with("ws://radio:8000/ws/audio on Speakers"));
    }
}
