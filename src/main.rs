use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use voicectl::app::{ListenOptions, inspect_model, run_levels_command, run_listen_command};
use voicectl::audio::capture::list_devices;
use voicectl::cli::{Cli, Commands, ConfigAction};
use voicectl::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(version = %voicectl::version_string(), "voicectl starting");

    match cli.command {
        None => {
            let Some(model) = cli.model else {
                eprintln!("{}", "A speaker model is required.".red());
                eprintln!("Usage: voicectl [OPTIONS] <MODEL>");
                std::process::exit(2);
            };
            let config = load_config(cli.config.as_deref())?;
            let options = ListenOptions {
                model,
                input: cli.input,
                device: cli.device,
                once: cli.once,
                json: cli.json,
                dry_run: cli.dry_run,
            };
            let code = run_listen_command(config, options)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Inspect { model }) => {
            inspect_model(&model)?;
        }
        Some(Commands::Levels { seconds }) => {
            let config = load_config(cli.config.as_deref())?;
            run_levels_command(&config, cli.device, seconds)?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "voicectl", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Install the log subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "voicectl=warn",
        1 => "voicectl=info",
        2 => "voicectl=debug",
        _ => "voicectl=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voicectl/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&config_path(None)?)?,
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

fn config_path(custom_path: Option<&Path>) -> Result<PathBuf> {
    match custom_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::default_path(),
    }
}

/// List available audio input devices.
fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Dump => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = config_path(custom_path)?;
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("{}", "(file does not exist, defaults are used)".dimmed());
            }
        }
    }
    Ok(())
}
