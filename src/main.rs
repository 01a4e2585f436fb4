use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use voxflow::audio::{AudioOutput, WavFileOutput};
use voxflow::cli::{Cli, Commands, ModelsAction, SpeakArgs};
use voxflow::config::{Config, VoiceKind};
use voxflow::models::download::{format_voice_info, list_installed_voices, voices_dir};
use voxflow::models::{get_voice, list_voices};
use voxflow::pipeline::SpeechPipeline;
use voxflow::voice::voice_from_config;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Speak(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_speak(config, args, cli.quiet)?;
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Models { action } => {
            handle_models_command(action, cli.quiet)?;
        }
        Commands::Config { default } => {
            let config = if default {
                Config::default()
            } else {
                load_config(cli.config.as_deref())?
            };
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxflow",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the verbosity flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "voxflow=debug",
        (false, _) => "voxflow=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration from custom path or default location.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path())?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

fn run_speak(mut config: Config, args: SpeakArgs, quiet: bool) -> Result<()> {
    if args.tone {
        config.voice.engine = VoiceKind::Tone;
    }
    if let Some(model) = args.model {
        config.voice.model = Some(model);
    }
    if args.device.is_some() {
        config.playback.device = args.device;
    }
    config.validate()?;

    let voice = voice_from_config(&config.voice)?;
    let output = open_output(&config, args.wav.as_deref())?;

    if !quiet {
        eprintln!(
            "{} {} → {}",
            "Speaking with".dimmed(),
            voice.name().green(),
            output.name()
        );
    }

    let mut pipeline = SpeechPipeline::new(config.to_pipeline_config(), voice, output);
    pipeline.start()?;

    if args.text.is_empty() {
        let stdin = std::io::stdin();
        if stdin.is_terminal() && !quiet {
            eprintln!("{}", "Reading text from stdin (Ctrl-D to finish)".dimmed());
        }
        for line in stdin.lock().lines() {
            let line = line.context("Failed to read stdin")?;
            pipeline.feed(&line);
            pipeline.feed("\n");
        }
    } else {
        pipeline.feed(&args.text.join(" "));
    }
    pipeline.finalize();

    if !pipeline.wait_until_idle(args.wait) {
        tracing::warn!(wait = ?args.wait, "playback did not finish in time, stopping");
        pipeline.stop();
    }

    let stats = pipeline.stats();
    let fault = pipeline.last_fault();
    pipeline.shutdown();

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    if let Some(fault) = fault {
        eprintln!("{}", format!("Error: {}", fault).red());
        std::process::exit(1);
    }

    Ok(())
}

/// Handle voice management commands.
fn handle_models_command(action: ModelsAction, quiet: bool) -> Result<()> {
    match action {
        ModelsAction::List => {
            println!("Suggested voices:");
            for voice in list_voices() {
                println!("  {}", format_voice_info(voice));
            }

            let extras: Vec<String> = list_installed_voices()
                .into_iter()
                .filter(|name| get_voice(name).is_none())
                .collect();
            if !extras.is_empty() {
                println!();
                println!("Other installed voices:");
                for name in extras {
                    println!("  {}", name);
                }
            }
            println!();
            println!("Voices directory: {}", voices_dir().display());
        }
        ModelsAction::Install { name, sha256 } => {
            let path = install_voice(&name, sha256.as_deref(), !quiet)?;
            println!("Voice '{}' installed successfully", name);
            println!("Location: {}", path.display());
        }
    }
    Ok(())
}

#[cfg(feature = "model-download")]
fn install_voice(name: &str, sha256: Option<&str>, progress: bool) -> Result<PathBuf> {
    use voxflow::models::download::download_voice;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start download runtime")?;
    Ok(runtime.block_on(download_voice(name, sha256, progress))?)
}

#[cfg(not(feature = "model-download"))]
fn install_voice(_name: &str, _sha256: Option<&str>, _progress: bool) -> Result<PathBuf> {
    anyhow::bail!("built without voice download support; enable the model-download feature")
}

fn open_output(config: &Config, wav: Option<&Path>) -> Result<Box<dyn AudioOutput>> {
    if let Some(path) = wav {
        return Ok(Box::new(WavFileOutput::new(path)));
    }
    open_device(config.playback.device.as_deref())
}

#[cfg(feature = "cpal-audio")]
fn open_device(device: Option<&str>) -> Result<Box<dyn AudioOutput>> {
    Ok(Box::new(voxflow::audio::CpalOutput::new(device)?))
}

#[cfg(not(feature = "cpal-audio"))]
fn open_device(_device: Option<&str>) -> Result<Box<dyn AudioOutput>> {
    anyhow::bail!("built without audio device support; use --wav PATH")
}

/// List available audio output devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = voxflow::audio::list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("built without audio device support")
}
