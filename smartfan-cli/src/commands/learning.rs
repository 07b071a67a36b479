//! Learning inspection and management commands.

use std::path::Path;
use std::sync::Arc;

use clap::Subcommand;
use smartfan::config::{config_file_path, ConfigFile};
use smartfan::learning::{AdaptiveLearningEngine, LearningState, LearningSummary, ResetScope};
use smartfan::service::FanControlService;
use smartfan::store::{FileLearningStore, LearningStore, SharedLearningStore};
use smartfan::FanMode;
use tokio::sync::mpsc;

use super::{load_config, resolve_ladder};
use crate::error::CliError;

/// Learning subcommands.
#[derive(Debug, Subcommand)]
pub enum LearningCommands {
    /// Show what has been learned for an entity
    Show {
        /// Climate entity id (e.g., climate.living_room)
        entity: String,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear learned data for an entity
    Reset {
        /// Climate entity id
        entity: String,

        /// Only clear the profile of this fan mode
        #[arg(long)]
        fan_mode: Option<String>,
    },

    /// Write the learned parameters into the entity's configuration section
    Apply {
        /// Climate entity id
        entity: String,
    },
}

/// Run a learning subcommand.
pub fn run(command: LearningCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let store = FileLearningStore::new(config.storage_dir.clone());

    match command {
        LearningCommands::Show { entity, json } => run_show(&config, &store, &entity, json),
        LearningCommands::Reset { entity, fan_mode } => {
            let scope = match fan_mode {
                Some(mode) => ResetScope::FanMode(FanMode::from(mode)),
                None => ResetScope::All,
            };
            run_reset(&config, &store, &entity, &scope)
        }
        LearningCommands::Apply { entity } => run_apply(config, store, &entity, config_path),
    }
}

fn run_show(
    config: &ConfigFile,
    store: &FileLearningStore,
    entity_id: &str,
    json: bool,
) -> Result<(), CliError> {
    let state = store.load(entity_id);
    let engine = AdaptiveLearningEngine::new(state, &config.controller_for(entity_id));
    let summary = engine.summary();

    if json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::Output(e.to_string()))?;
        println!("{}", text);
    } else {
        print_summary(entity_id, &summary);
    }
    Ok(())
}

fn print_summary(entity_id: &str, summary: &LearningSummary) {
    println!("Learning: {}", entity_id);
    println!("=========={}", "=".repeat(entity_id.len()));
    println!();
    println!("  Enabled:        {}", summary.enabled);
    println!("  Confidence:     {:.0}%", summary.confidence * 100.0);
    println!(
        "  Decisions:      {} ({} successful)",
        summary.total_decisions, summary.successful_predictions
    );
    println!("  Inertia:        {:.2} h/°C", summary.thermal_inertia);
    println!("  Response time:  {:.0} s", summary.avg_response_time);
    println!(
        "  Last saved:     {}",
        summary.last_saved.as_deref().unwrap_or("never")
    );
    println!();

    let p = &summary.active_parameters;
    println!("Active parameters");
    println!("───────────────");
    println!("  deadband={:.2} soft={:.2} hard={:.2}", p.deadband, p.soft_error, p.hard_error);
    println!(
        "  min_interval={:.1} min projected={:.2}",
        p.min_interval_minutes, p.projection_threshold
    );

    if summary.fan_modes.is_empty() {
        return;
    }
    println!();
    println!("Fan modes");
    println!("───────────────");
    for (mode, profile) in &summary.fan_modes {
        println!(
            "  {:<10} activations={:<5} effectiveness={:.2} slope_change={:+.2} overshoots={} undershoots={}",
            mode,
            profile.activations,
            profile.effectiveness,
            profile.avg_slope_change,
            profile.overshoots,
            profile.undershoots
        );
    }
}

fn run_reset(
    config: &ConfigFile,
    store: &FileLearningStore,
    entity_id: &str,
    scope: &ResetScope,
) -> Result<(), CliError> {
    // A full reset never reads the old record, so unreadable records can be cleared.
    let state = match scope {
        ResetScope::All => LearningState::default(),
        ResetScope::FanMode(_) => store.load(entity_id),
    };
    let mut engine = AdaptiveLearningEngine::new(state, &config.controller_for(entity_id));

    if !engine.reset(scope) {
        println!("Nothing to reset for {}", entity_id);
        return Ok(());
    }
    let snapshot = engine.snapshot_for_save();
    store.save(entity_id, &snapshot)?;

    match scope {
        ResetScope::All => println!("Cleared all learned data for {}", entity_id),
        ResetScope::FanMode(mode) => println!("Cleared profile '{}' for {}", mode, entity_id),
    }
    Ok(())
}

fn run_apply(
    mut config: ConfigFile,
    store: FileLearningStore,
    entity_id: &str,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let ladder = resolve_ladder(None, &config, entity_id)?;
    let store: SharedLearningStore = Arc::new(store);
    let (commands, _) = mpsc::channel(1);
    let mut service = FanControlService::new(store, config.learning.clone(), commands);
    service.register(entity_id, config.controller_for(entity_id), ladder)?;

    let applied = service.apply_learned_settings(entity_id)?;
    config.set_entity_controller(entity_id, &applied);

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);
    config.save_to(&path)?;

    println!("Applied learned settings for {}:", entity_id);
    println!("  deadband = {:.2}", applied.deadband);
    println!("  soft_error = {:.2}", applied.soft_error);
    println!("  hard_error = {:.2}", applied.hard_error);
    println!("  min_interval = {:.1}", applied.min_interval_minutes);
    println!("  projected_error_threshold = {:.2}", applied.projected_error_threshold);
    println!();
    println!("Saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartfan::learning::FanModeProfile;

    fn seeded_store(dir: &Path) -> FileLearningStore {
        let store = FileLearningStore::new(dir);
        let mut state = LearningState::new();
        state
            .fan_mode_profiles
            .insert(FanMode::from("low"), FanModeProfile::default());
        state.metadata.total_decisions = 12;
        store.save("climate.office", &state).unwrap();
        store
    }

    #[test]
    fn test_reset_single_fan_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let scope = ResetScope::FanMode(FanMode::from("low"));

        run_reset(&ConfigFile::default(), &store, "climate.office", &scope).unwrap();

        let state = store.try_load("climate.office").unwrap().unwrap();
        assert!(state.fan_mode_profiles.is_empty());
        assert_eq!(state.metadata.total_decisions, 12);
    }

    #[test]
    fn test_full_reset_replaces_truncated_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLearningStore::new(dir.path());
        std::fs::write(
            store.path_for("climate.office"),
            br#"{"schema_version": 2, "meta"#,
        )
        .unwrap();
        assert!(store.try_load("climate.office").is_err());

        run_reset(&ConfigFile::default(), &store, "climate.office", &ResetScope::All).unwrap();

        let state = store.try_load("climate.office").unwrap().unwrap();
        assert_eq!(state.metadata.total_decisions, 0);
        assert!(state.metadata.created_at.is_some());
        assert!(state.metadata.last_saved.is_some());
    }

    #[test]
    fn test_scoped_reset_and_show_tolerate_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLearningStore::new(dir.path());
        std::fs::write(store.path_for("climate.office"), br#"{"schema_version": 9}"#).unwrap();

        run_show(&ConfigFile::default(), &store, "climate.office", true).unwrap();
        let scope = ResetScope::FanMode(FanMode::from("low"));
        run_reset(&ConfigFile::default(), &store, "climate.office", &scope).unwrap();
    }

    #[test]
    fn test_reset_unknown_mode_leaves_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let scope = ResetScope::FanMode(FanMode::from("turbo"));

        run_reset(&ConfigFile::default(), &store, "climate.office", &scope).unwrap();

        let state = store.try_load("climate.office").unwrap().unwrap();
        assert_eq!(state.fan_mode_profiles.len(), 1);
    }

    #[test]
    fn test_apply_refuses_without_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let config_path = dir.path().join("config.ini");

        let result = run_apply(
            ConfigFile::default(),
            store,
            "climate.office",
            Some(config_path.as_path()),
        );
        assert!(matches!(result, Err(CliError::Service(_))));
        assert!(!config_path.exists());
    }
}
