//! Configuration CLI commands.

use std::path::Path;

use clap::Subcommand;
use smartfan::config::config_file_path;

use super::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// List the effective configuration
    List,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            let path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(config_file_path);
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::List => run_list(config_path),
    }
}

fn run_list(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let c = &config.controller;

    println!("Configuration Settings");
    println!("======================");
    println!();
    println!("[controller]");
    println!("  deadband = {}", c.deadband);
    println!("  min_interval = {}", c.min_interval_minutes);
    println!("  soft_error = {}", c.soft_error);
    println!("  hard_error = {}", c.hard_error);
    println!("  projected_error_threshold = {}", c.projected_error_threshold);
    println!("  limit_timeout = {}", c.limit_timeout_minutes);
    println!();
    println!("[learning]");
    println!("  enabled = {}", c.enable_adaptive_learning);
    println!("  learning_rate = {}", c.learning_rate);
    println!("  save_interval = {}", config.learning.save_interval_minutes);
    println!("  save_every_decisions = {}", config.learning.save_every_decisions);
    println!();
    println!("[storage]");
    println!("  directory = {}", config.storage_dir.display());

    for (entity_id, settings) in &config.entities {
        let effective = config.controller_for(entity_id);
        println!();
        println!("[entity:{}]", entity_id);
        if settings.fan_modes.is_empty() {
            println!("  fan_modes = (not set)");
        } else {
            println!("  fan_modes = {}", settings.fan_modes.join(", "));
        }
        println!(
            "  effective: deadband={} soft={} hard={} min_interval={} projected={}",
            effective.deadband,
            effective.soft_error,
            effective.hard_error,
            effective.min_interval_minutes,
            effective.projected_error_threshold
        );
    }

    Ok(())
}
