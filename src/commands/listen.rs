//! Live stream playback with waveform and spectrogram display.
//!
//! Starts the pipeline, then redraws the view on a fixed-interval ticker until
//! the user quits. SIGUSR1 toggles mute from outside the terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::config::AirwaveConfig;
use crate::pipeline::{Pipeline, PipelineHandles, Refresher};
use crate::playback::{mute_flag, MuteFlag};
use crate::stream::lock_stats;
use crate::ui::error::show_fatal;
use crate::ui::listen::{FooterStatus, ListenCommand, ListenTui};
use crate::visualizations::SpectrumAnalyzer;

/// Ticks between periodic status log lines.
const STATUS_LOG_TICKS: u64 = 300;

/// Command-line overrides for a listen session.
#[derive(Debug, Clone, Default)]
pub struct ListenOptions {
    pub url: Option<String>,
    pub device: Option<String>,
    pub muted: bool,
}

impl ListenOptions {
    /// Applies the overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut AirwaveConfig) {
        if let Some(url) = &self.url {
            config.stream.url = url.clone();
        }
        if let Some(device) = &self.device {
            config.playback.device = device.clone();
        }
    }
}

/// Plays the configured stream until the user quits.
///
/// # Errors
/// - If the configuration cannot be loaded
/// - If the output device cannot be opened
/// - If the terminal cannot be drawn
pub async fn handle_listen(options: ListenOptions) -> Result<(), anyhow::Error> {
    tracing::info!("=== airwave listener started ===");

    let mut config = match AirwaveConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            show_fatal(
                "Configuration Error",
                &format!("{err}\n\nPlease check your ~/.config/airwave/airwave.toml file and try again."),
            )?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };
    options.apply(&mut config);

    tracing::info!(
        "Configuration loaded: url={}, sample_rate={}Hz, device={}, lead={}ms, refresh={}Hz",
        config.stream.url,
        config.stream.sample_rate,
        config.playback.device,
        config.playback.lead_time_ms,
        config.visuals.refresh_hz
    );

    let mute = mute_flag(options.muted);
    let (pipeline, mut refresher, handles) = match Pipeline::start(&config, mute.clone()) {
        Ok(started) => started,
        Err(e) => {
            tracing::error!("Failed to start playback: {}", e);
            show_fatal(
                "Playback Error",
                &format!("{e}\n\nRun 'airwave list-devices' to check your output device."),
            )?;
            return Err(e.into());
        }
    };

    let external_toggle = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, external_toggle.clone())
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    let mut tui = ListenTui::new().map_err(|e| anyhow::anyhow!("Failed to initialize UI: {e}"))?;

    let source = format!(
        "{} on {}",
        pipeline.url(),
        pipeline.device_name().unwrap_or("unknown device")
    );

    let mut ticker = interval(config.visuals.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!("Entering refresh loop. Press 'm' to mute, 'q'/Escape to quit.");
    let result = refresh_loop(
        &mut tui,
        &mut refresher,
        &handles,
        &mute,
        &external_toggle,
        &mut ticker,
        &source,
    )
    .await;

    if let Err(e) = tui.cleanup() {
        tracing::warn!("Terminal cleanup failed: {}", e);
    }
    pipeline.stop().await;

    {
        let stats = lock_stats(&handles.stats);
        tracing::info!(
            "Session totals: {} frames, {} samples, {} malformed, {} re-snaps, {} reconnects",
            stats.frames,
            stats.samples,
            stats.malformed,
            stats.resnaps,
            stats.reconnects
        );
    }

    result?;
    tracing::info!("=== airwave listener exited ===");
    Ok(())
}

async fn refresh_loop<A: SpectrumAnalyzer>(
    tui: &mut ListenTui,
    refresher: &mut Refresher<A>,
    handles: &PipelineHandles,
    mute: &MuteFlag,
    external_toggle: &AtomicBool,
    ticker: &mut Interval,
    source: &str,
) -> anyhow::Result<()> {
    let mut ticks = 0u64;

    loop {
        ticker.tick().await;

        if external_toggle.swap(false, Ordering::Relaxed) {
            toggle_mute(mute, "SIGUSR1");
        }

        match tui.handle_input()? {
            ListenCommand::Quit => break,
            ListenCommand::ToggleMute => toggle_mute(mute, "key"),
            ListenCommand::Continue => {}
        }

        let (width, height) = tui.layout()?.raster_size();
        refresher.resize(width, height);

        if let Some(segment) = refresher.tick(Instant::now()) {
            tui.set_waveform(segment);
        }

        let status = FooterStatus {
            state: *handles.state.borrow(),
            level: *handles.level.borrow(),
            muted: mute.load(Ordering::Relaxed),
            lag: lock_stats(&handles.stats).mean_interval(),
            source: source.to_string(),
        };

        ticks += 1;
        if ticks.is_multiple_of(STATUS_LOG_TICKS) {
            tracing::debug!(
                "Status: {}, level {}%, lag {:?}",
                status.state,
                status.level.percent(),
                status.lag
            );
        }

        tui.render(refresher.raster(), &refresher.axis(), &status)?;
    }

    Ok(())
}

fn toggle_mute(mute: &MuteFlag, source: &str) {
    let was_muted = mute.fetch_xor(true, Ordering::Relaxed);
    tracing::info!(
        "Output {} ({})",
        if was_muted { "unmuted" } else { "muted" },
        source
    );
}
