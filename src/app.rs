//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to the command handlers.

use crate::commands::{self, ListenOptions};
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::process;

/// Live PCM stream player with a rolling waveform and scrolling spectrogram
#[derive(Parser)]
#[command(name = "airwave")]
#[command(version)]
#[command(long_about = "Live PCM stream player with a rolling waveform and scrolling spectrogram.\n\nConnects to a WebSocket that sends little-endian f32 mono frames, plays them\ngaplessly on an output device and draws the audio in the terminal.\n\nDEFAULT COMMAND:\n    If no command is specified, 'listen' is used by default.\n\nEXAMPLES:\n    # Listen to the configured stream\n    $ airwave\n\n    # Listen to another stream on a specific device, starting muted\n    $ airwave listen --url ws://radio.local:8000/ws/audio --device 1 --muted\n\n    # Toggle mute from another terminal\n    $ pkill -USR1 airwave")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/airwave/airwave.toml\n    Logs:               ~/.local/state/airwave/airwave.log.*"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the live stream with waveform and spectrogram (default)
    ///
    /// Press 'm' to toggle mute, 'q' or Escape to quit.
    #[command(visible_alias = "l")]
    Listen {
        /// WebSocket URL, overriding stream.url
        #[arg(short, long, value_name = "URL")]
        url: Option<String>,

        /// Output device name or ID, overriding playback.device
        #[arg(short, long, value_name = "DEVICE")]
        device: Option<String>,

        /// Start with output muted
        #[arg(short, long)]
        muted: bool,
    },

    /// Open configuration file in your preferred editor
    ///
    /// Uses $EDITOR environment variable or falls back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// List available audio output devices
    ///
    /// Shows device IDs, names, and configurations to help configure
    /// the output device in airwave.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   airwave completions bash > airwave.bash
    ///   airwave completions zsh > _airwave
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the application based on command-line arguments.
///
/// # Errors
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that don't need logging
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "airwave", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            return match commands::handle_list_devices() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        Some(Commands::Logs) => {
            return match commands::handle_logs() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        _ => {}
    }

    logging::init_logging()?;

    match cli.command {
        None => commands::handle_listen(ListenOptions::default()).await?,
        Some(Commands::Listen { url, device, muted }) => {
            commands::handle_listen(ListenOptions { url, device, muted }).await?
        }
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}
