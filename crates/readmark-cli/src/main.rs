//! readmark CLI
//!
//! Command-line interface for readmark - manga reading progress.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use readmark_core::{Config, StorageError, SyncError, Tracker};

mod commands;
mod output;
mod prompt;

use commands::read::ReadArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "readmark")]
#[command(about = "readmark - Manga reading progress tracker")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long = "config", id = "config_file", value_name = "PATH", global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show storage, tracking mode and reading statistics
    Status,
    /// List reading history, most recent first
    #[command(alias = "ls")]
    List,
    /// Show progress for one manga
    Show {
        /// Manga ID
        manga_id: String,
    },
    /// Read pages of a chapter, recording progress as a reader would
    Read(ReadArgs),
    /// Delete progress for one manga
    #[command(alias = "rm")]
    Delete {
        /// Manga ID
        manga_id: String,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Copy the progress file over the backup
    Backup,
    /// Replace the progress file with the backup
    Restore {
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, debounce_ms, recovery, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config_file.as_ref();

    // Config commands don't need the tracker
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);
    debug!("Using data directory {:?}", config.data_dir);

    let tracker = Tracker::open_with_config(config)?;

    let result = match cli.command {
        // Read owns the tracker: it closes it and then reports write failures
        Commands::Read(args) => commands::read::read(tracker, args, &output).await,
        command => {
            let result = match command {
                Commands::Status => commands::status::show(&tracker, &output).await,
                Commands::List => commands::progress::list(&tracker, &output).await,
                Commands::Show { manga_id } => {
                    commands::progress::show(&tracker, manga_id, &output).await
                }
                Commands::Delete { manga_id, yes } => {
                    commands::progress::delete(&tracker, manga_id, yes, &output).await
                }
                Commands::Backup => commands::storage::backup(&tracker, &output).await,
                Commands::Restore { yes } => {
                    commands::storage::restore(&tracker, yes, &output).await
                }
                Commands::Read(_) | Commands::Config { .. } => Ok(()), // Handled above
            };
            tracker.close().await;
            result
        }
    };

    if let Some(hint) = result.as_ref().err().and_then(recovery_hint) {
        eprintln!("Hint: {}", hint);
    }
    result
}

/// What the user can do about a storage failure, if anything
fn recovery_hint(error: &anyhow::Error) -> Option<&'static str> {
    error.chain().find_map(|cause| {
        if let Some(SyncError::Storage(storage)) = cause.downcast_ref::<SyncError>() {
            return storage.recovery_suggestion();
        }
        cause
            .downcast_ref::<StorageError>()
            .and_then(StorageError::recovery_suggestion)
    })
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Log to a file when READMARK_LOG is set (e.g. READMARK_LOG=debug)
///
/// Terminal output stays reserved for command results.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("READMARK_LOG") else {
        return;
    };

    let log_path = config.log_path();
    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "readmark_core={},readmark={}",
        log_level, log_level
    ));

    // Ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["readmark", "list", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_cli_config_file_flag() {
        let cli =
            Cli::try_parse_from(["readmark", "--config", "/tmp/rm.toml", "config", "show"]).unwrap();
        assert_eq!(cli.config_file, Some(PathBuf::from("/tmp/rm.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: Some(ConfigCommands::Show)
            }
        ));
    }

    #[test]
    fn test_cli_aliases() {
        let cli = Cli::try_parse_from(["readmark", "rm", "m1", "-y"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Delete { ref manga_id, yes: true } if manga_id == "m1"
        ));
    }

    #[test]
    fn test_recovery_hint_found_through_context() {
        let disk_full = StorageError::from_io(
            std::io::Error::new(std::io::ErrorKind::Other, "No space left on device"),
            PathBuf::from("/data/progress.json"),
        );
        let error = anyhow::Error::new(SyncError::Storage(disk_full))
            .context("Failed to delete progress for 'm1'");
        assert_eq!(
            recovery_hint(&error),
            Some("Free up disk space and try again.")
        );

        let backup = anyhow::Error::new(StorageError::Corrupt {
            path: PathBuf::from("/data/progress.json"),
            details: "truncated".to_string(),
        })
        .context("Failed to back up progress");
        assert!(recovery_hint(&backup).unwrap().contains("restore"));

        assert!(recovery_hint(&anyhow::anyhow!("No progress recorded for: m1")).is_none());
    }

    #[test]
    fn test_cli_read_command() {
        let cli = Cli::try_parse_from([
            "readmark", "read", "m1", "c1", "--pages", "20", "--to", "19", "--incognito",
        ])
        .unwrap();
        match cli.command {
            Commands::Read(args) => {
                assert_eq!(args.pages, 20);
                assert_eq!(args.to, Some(19));
                assert!(args.incognito);
            }
            _ => panic!("expected read command"),
        }
    }
}
