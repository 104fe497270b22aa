//! Pedidos CLI
//!
//! Command-line interface over the pedidos persistence layer.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pedidos_core::{Collection, Config, Persistence};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "pedidos")]
#[command(about = "Pedidos - local order, finance and contact storage")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show storage locations, versions and record counts
    Status,
    /// Write the app version marker (first-time setup)
    Init,
    /// Print every record in a collection
    #[command(alias = "ls")]
    Load {
        /// Collection: orders, transactions or contacts
        collection: Collection,
    },
    /// Replace a collection with a JSON array of records
    Save {
        /// Collection: orders, transactions or contacts
        collection: Collection,
        /// File holding the JSON array, or `-` for stdin
        file: PathBuf,
    },
    /// Delete all data in every collection
    Clear {
        /// Confirm deletion
        #[arg(long)]
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
        /// Configuration key (data_dir, database_name, primary_enabled, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work even when the data directory is unusable
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => {
                commands::config::show(cli.config.as_ref(), &output)
            }
            Some(ConfigCommands::Set { key, value }) => commands::config::set(
                key.clone(),
                value.clone(),
                cli.config.as_ref(),
                &output,
            ),
        };
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);
    debug!("Using data directory {:?}", config.data_dir);

    let persistence = Persistence::open(&config);

    match cli.command {
        Commands::Status => commands::status::show(&persistence, &config, &output).await,
        Commands::Init => commands::data::init(&persistence, &output).await,
        Commands::Load { collection } => {
            commands::data::load(&persistence, collection, &output).await
        }
        Commands::Save { collection, file } => {
            commands::data::save(&persistence, collection, &file, &output).await
        }
        Commands::Clear { yes } => commands::data::clear(&persistence, yes, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Initialize logging to stderr, or to the configured log file
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(config: &Config, verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("pedidos_core={},pedidos_cli={}", log_level, log_level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore errors if a subscriber is already installed
    match &config.log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(file).try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
