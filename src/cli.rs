//! Command-line interface for voxflow
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Streaming text-to-speech
#[derive(Parser, Debug)]
#[command(name = "voxflow", version, about = "Streaming text-to-speech")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Speak text given as arguments, or stream lines from stdin
    Speak(SpeakArgs),

    /// List available audio output devices
    Devices,

    /// Manage piper voices
    Models {
        /// Action to perform
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print built-in defaults instead of the loaded file
        #[arg(long)]
        default: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Voice management actions
#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// List suggested and installed voices
    List,
    /// Download and install a voice
    Install {
        /// Voice name (e.g., fr_FR-siwis-medium, en_US-amy-medium)
        #[arg(default_value = crate::defaults::DEFAULT_VOICE)]
        name: String,

        /// Expected SHA-256 of the .onnx file
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,
    },
}

/// Options for `voxflow speak`
#[derive(clap::Args, Debug)]
pub struct SpeakArgs {
    /// Text to speak (reads stdin when omitted)
    pub text: Vec<String>,

    /// Use the built-in tone voice instead of piper
    #[arg(long)]
    pub tone: bool,

    /// Write audio to a WAV file instead of the sound card
    #[arg(long, value_name = "PATH")]
    pub wav: Option<PathBuf>,

    /// Piper voice model (.onnx path or installed voice name)
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Audio output device name
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// Print pipeline statistics as JSON when done
    #[arg(long)]
    pub stats: bool,

    /// Longest time to wait for playback to finish (default: 5m). Examples: 30s, 2m
    #[arg(long, value_name = "DURATION", default_value = "5m", value_parser = parse_wait)]
    pub wait: Duration,
}

/// Parse a wait duration.
///
/// Supports any duration format accepted by `humantime`, plus bare numbers
/// (seconds).
fn parse_wait(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}
