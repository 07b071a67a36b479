//! Simulate command - drive one controller against a simulated room.
//!
//! The room is a first-order thermal model: it drifts toward the outdoor
//! temperature and the HVAC unit adds heat (or removes it) in proportion
//! to the fan speed. Simulated time runs as fast as the controller can
//! decide, or paced with `--step-delay-ms`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use smartfan::config::ConfigFile;
use smartfan::controller::SensorSample;
use smartfan::decision::HvacMode;
use smartfan::service::{FanCommand, FanControlService, ServiceError};
use smartfan::store::{FileLearningStore, SharedLearningStore};
use smartfan::{ControlError, FanModeLadder};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{load_config, resolve_ladder};
use crate::error::CliError;

/// HVAC mode selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum HvacArg {
    /// Heat toward the target
    Heat,
    /// Cool toward the target
    Cool,
}

impl From<HvacArg> for HvacMode {
    fn from(arg: HvacArg) -> Self {
        match arg {
            HvacArg::Heat => HvacMode::Heat,
            HvacArg::Cool => HvacMode::Cool,
        }
    }
}

/// Arguments for the simulate command.
#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Entity id the simulated room is stored under
    #[arg(long, default_value = "climate.simulated")]
    pub entity: String,

    /// Initial room temperature (°C)
    #[arg(long, default_value_t = 18.0)]
    pub start_temp: f64,

    /// Target temperature (°C)
    #[arg(long, default_value_t = 21.0)]
    pub target: f64,

    /// Outdoor temperature (°C)
    #[arg(long, default_value_t = 8.0)]
    pub outdoor: f64,

    #[arg(long, value_enum, default_value_t = HvacArg::Heat)]
    pub hvac: HvacArg,

    /// Simulated duration (minutes)
    #[arg(long, default_value_t = 240)]
    pub minutes: u64,

    /// Sensor sample interval (seconds of simulated time)
    #[arg(long, default_value_t = 60)]
    pub step_secs: u64,

    /// Wall-clock pause between samples (milliseconds)
    #[arg(long, default_value_t = 0)]
    pub step_delay_ms: u64,

    /// Comma-separated fan modes, slowest first
    #[arg(long)]
    pub fan_modes: Option<String>,

    /// Directory for learning records (defaults to the configured one)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

/// First-order room model.
#[derive(Debug, Clone)]
pub struct RoomModel {
    pub temperature: f64,
    pub outdoor: f64,
    /// Time constant of the envelope (hours).
    pub envelope_hours: f64,
    /// HVAC output at full fan speed (°C/h).
    pub max_output: f64,
    pub hvac: HvacMode,
}

impl RoomModel {
    pub fn new(temperature: f64, outdoor: f64, hvac: HvacMode) -> Self {
        Self {
            temperature,
            outdoor,
            envelope_hours: 3.0,
            max_output: 4.0,
            hvac,
        }
    }

    /// Rate of change (°C/h) with the fan at `fan_index` of `fan_count`.
    pub fn slope(&self, fan_index: usize, fan_count: usize) -> f64 {
        let loss = (self.outdoor - self.temperature) / self.envelope_hours;
        let share = (fan_index + 1) as f64 / fan_count.max(1) as f64;
        loss + self.hvac.sign() * self.max_output * share
    }

    /// Advance by `dt_hours`, returning the slope that was applied.
    pub fn advance(&mut self, fan_index: usize, fan_count: usize, dt_hours: f64) -> f64 {
        let slope = self.slope(fan_index, fan_count);
        self.temperature += slope * dt_hours;
        slope
    }
}

/// Run the simulate command.
pub fn run(args: SimulateArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    if args.step_secs == 0 {
        return Err(CliError::Config("--step-secs must be at least 1".to_string()));
    }
    let config = load_config(config_path)?;
    let ladder = resolve_ladder(args.fan_modes.as_deref(), &config, &args.entity)?;
    let store_dir = args.store_dir.clone().unwrap_or_else(|| config.storage_dir.clone());

    println!("Smart Fan Simulation v{}", smartfan::VERSION);
    println!("==========================");
    println!();
    println!("Entity:   {}", args.entity);
    println!(
        "Room:     {:.1}°C → {:.1}°C ({}, outdoor {:.1}°C)",
        args.start_temp,
        args.target,
        HvacMode::from(args.hvac),
        args.outdoor
    );
    println!("Fan:      {}", join_modes(&ladder));
    println!("Learning: {}", store_dir.display());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, saving learning state...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let store: SharedLearningStore = Arc::new(FileLearningStore::new(store_dir));
    runtime.block_on(simulate(args, config, ladder, store, cancel))
}

async fn simulate(
    args: SimulateArgs,
    config: ConfigFile,
    ladder: FanModeLadder,
    store: SharedLearningStore,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let (command_tx, command_rx) = mpsc::channel(32);
    let mut service = FanControlService::new(store, config.learning.clone(), command_tx);
    service.register(&args.entity, config.controller_for(&args.entity), ladder.clone())?;
    let printer = tokio::spawn(print_commands(command_rx));

    let hvac = HvacMode::from(args.hvac);
    let mut room = RoomModel::new(args.start_temp, args.outdoor, hvac);
    let mut fan_index = 0;
    let step = Duration::from_secs(args.step_secs);
    let dt_hours = step.as_secs_f64() / 3600.0;
    let steps = args.minutes * 60 / args.step_secs;
    let start = Instant::now();
    let mut stats = SimulationStats::default();

    for i in 0..=steps {
        if cancel.is_cancelled() {
            break;
        }

        let sample = SensorSample::new(
            start + step * i as u32,
            room.temperature,
            args.target,
            room.slope(fan_index, ladder.len()),
        )
        .with_fan_mode(ladder.mode_at(fan_index).clone())
        .with_hvac_mode(hvac);

        match service.handle_sample(&args.entity, &sample).await {
            Ok(report) => {
                if let Some(mode) = &report.command {
                    fan_index = ladder.index_or_lowest(Some(mode));
                    stats.changes += 1;
                }
                if report.decision.suppressed.is_some() {
                    stats.suppressed += 1;
                }
            }
            Err(ServiceError::Control(ControlError::InsufficientData(what))) => {
                tracing::debug!(missing = what, "Sample skipped");
            }
            Err(e) => return Err(e.into()),
        }

        room.advance(fan_index, ladder.len(), dt_hours);
        let error = hvac.signed_error(room.temperature, args.target).abs();
        stats.max_error = stats.max_error.max(error);
        stats.steps += 1;

        if args.step_delay_ms > 0 {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(args.step_delay_ms)) => {}
            }
        }
    }

    let summary = service.learning_summary(&args.entity)?;
    let flushed = service.flush().await;
    drop(service);
    let _ = printer.await;

    println!();
    println!("Session Summary");
    println!("───────────────");
    println!(
        "  Simulated:     {} min ({} samples)",
        stats.steps * args.step_secs / 60,
        stats.steps
    );
    println!("  Final temp:    {:.2}°C (target {:.1}°C)", room.temperature, args.target);
    println!("  Max error:     {:.2}°C", stats.max_error);
    println!(
        "  Fan changes:   {} ({} held by anti-cycling)",
        stats.changes, stats.suppressed
    );
    println!("  Final mode:    {}", ladder.mode_at(fan_index));
    println!(
        "  Learning:      {:.0}% confidence over {} decisions",
        summary.confidence * 100.0,
        summary.total_decisions
    );
    if flushed.failed > 0 {
        println!("  Warning:       learning state could not be saved");
    }
    Ok(())
}

#[derive(Debug, Default)]
struct SimulationStats {
    steps: u64,
    changes: u64,
    suppressed: u64,
    max_error: f64,
}

async fn print_commands(mut commands: mpsc::Receiver<FanCommand>) {
    while let Some(command) = commands.recv().await {
        println!(
            "  → {:<8} [{}] {}",
            command.fan_mode, command.zone, command.reason
        );
    }
}

fn join_modes(ladder: &FanModeLadder) -> String {
    ladder
        .modes()
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}
