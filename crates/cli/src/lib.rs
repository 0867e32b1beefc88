//! lintel CLI library
//!
//! Argument parsing and command dispatch for the `lintel` binary, kept in a
//! library so commands can be driven from tests.

pub mod cmd;
pub mod command;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use lintel_config::CONFIG_FILE;
use lintel_engine::Store;
use std::path::PathBuf;

use command::{Command, Context};

/// lintel - run git hooks against the files you are committing
#[derive(Parser)]
#[command(name = "lintel")]
#[command(about = "Run git hooks against staged files")]
#[command(version)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, env = "LINTEL_CONFIG", value_name = "FILE", default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable verbose output (DEBUG logs and details for every hook)
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to a file (useful for debugging)
    #[arg(long, env = "LINTEL_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the lintel CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Run hooks
    Run(cmd::run::RunCommand),

    /// Remove cached hook repositories no tracked config uses
    Gc(cmd::gc::GcCommand),

    /// Delete the whole cache
    Clean(cmd::clean::CleanCommand),

    /// Print the tags lintel assigns to files
    Identify(cmd::identify::IdentifyCommand),
}

/// Run the CLI and return the process exit code
///
/// # Errors
///
/// Returns an error if:
/// - Logging initialization fails
/// - The cache directory cannot be determined
/// - The command itself fails
pub fn run(cli: Cli) -> Result<i32> {
    lintel_config::logging::init(cli.verbose, cli.log_file.as_deref())
        .context("Failed to initialize logging")?;

    let store = Store::open_default().context("Failed to open the hook cache")?;
    let context = Context {
        config: cli.config,
        verbose: cli.verbose,
        store,
    };

    match cli.command {
        Commands::Run(command) => command.execute(&context),
        Commands::Gc(command) => command.execute(&context),
        Commands::Clean(command) => command.execute(&context),
        Commands::Identify(command) => command.execute(&context),
    }
}
