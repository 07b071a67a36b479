//! Smart Fan CLI - Command-line interface
//!
//! Runs the fan controller against a simulated room and manages learned
//! state and configuration.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use smartfan::logging::{init_logging, LoggingConfig};

use commands::config::ConfigCommands;
use commands::learning::LearningCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "smartfan")]
#[command(about = "Adaptive fan-speed controller for HVAC units", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write daily log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the controller against a simulated room
    Simulate(SimulateArgs),

    /// Inspect and manage learned data
    Learning {
        #[command(subcommand)]
        command: LearningCommands,
    },

    /// View configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let _log_guard = init_logging(&LoggingConfig {
        level: cli.log_level.clone(),
        log_dir: cli.log_dir.clone(),
    });

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args, config_path),
        Commands::Learning { command } => commands::learning::run(command, config_path),
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}
