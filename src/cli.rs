//! Command-line interface for voicectl
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Speaker-dependent voice control
#[derive(Parser, Debug)]
#[command(
    name = "voicectl",
    version,
    about = "Speaker-dependent voice control",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Speaker model to listen with (.cvc, extension optional)
    #[arg(value_name = "MODEL")]
    pub model: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., pulse, hw:0)
    #[arg(long, global = true, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Replay a WAV file instead of listening to the microphone
    #[arg(long, value_name = "WAV")]
    pub input: Option<PathBuf>,

    /// Exit with the first recognized item index as exit code, without
    /// running its command
    #[arg(long)]
    pub once: bool,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Print recognized commands instead of running them
    #[arg(long)]
    pub dry_run: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Show the items and samples of a speaker model
    Inspect {
        /// Speaker model file
        #[arg(value_name = "MODEL")]
        model: PathBuf,
    },

    /// Print the peak level of incoming audio, for choosing rec/stop levels
    Levels {
        /// Seconds to sample
        #[arg(long, short = 's', value_name = "SECONDS", default_value = "5")]
        seconds: u64,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Dump,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_only() {
        let cli = Cli::try_parse_from(["voicectl", "words.cvc"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.model, Some(PathBuf::from("words.cvc")));
        assert!(cli.device.is_none());
        assert!(cli.input.is_none());
        assert!(!cli.once);
        assert!(!cli.json);
        assert!(!cli.dry_run);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_levels() {
        let cli = Cli::try_parse_from(["voicectl", "-v", "m"]).unwrap();
        assert_eq!(cli.verbose, 1);
        let cli = Cli::try_parse_from(["voicectl", "-vvv", "m"]).unwrap();
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_parse_run_options() {
        let cli = Cli::try_parse_from([
            "voicectl",
            "--device",
            "hw:0",
            "--input",
            "take.wav",
            "--once",
            "--json",
            "--dry-run",
            "words",
        ])
        .unwrap();

        assert_eq!(cli.device.as_deref(), Some("hw:0"));
        assert_eq!(cli.input, Some(PathBuf::from("take.wav")));
        assert!(cli.once);
        assert!(cli.json);
        assert!(cli.dry_run);
        assert_eq!(cli.model, Some(PathBuf::from("words")));
    }

    #[test]
    fn test_parse_devices() {
        let cli = Cli::try_parse_from(["voicectl", "devices"]).unwrap();
        match cli.command {
            Some(Commands::Devices) => {}
            _ => panic!("Expected Devices command"),
        }
        assert!(cli.model.is_none());
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from(["voicectl", "inspect", "words.cvc"]).unwrap();
        match cli.command {
            Some(Commands::Inspect { model }) => assert_eq!(model, PathBuf::from("words.cvc")),
            _ => panic!("Expected Inspect command"),
        }
    }

    #[test]
    fn test_parse_levels_default_duration() {
        let cli = Cli::try_parse_from(["voicectl", "levels", "--device", "pulse"]).unwrap();
        match cli.command {
            Some(Commands::Levels { seconds }) => assert_eq!(seconds, 5),
            _ => panic!("Expected Levels command"),
        }
        assert_eq!(cli.device.as_deref(), Some("pulse"));
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["voicectl", "config", "dump"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Dump
            })
        ));

        let cli = Cli::try_parse_from(["voicectl", "--config", "/tmp/c.toml", "config", "path"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Path
            })
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["voicectl", "completions", "bash"]).unwrap();
        match cli.command {
            Some(Commands::Completions { shell }) => assert_eq!(shell, Shell::Bash),
            _ => panic!("Expected Completions command"),
        }
    }

    #[test]
    fn test_run_flags_conflict_with_subcommands() {
        assert!(Cli::try_parse_from(["voicectl", "--once", "devices"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
