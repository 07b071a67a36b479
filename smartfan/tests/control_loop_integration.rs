//! Integration tests for the fan control service.
//!
//! These tests drive the complete loop through its channels:
//! - sensor samples → decisions → fan commands
//! - observations → learning state → JSON records on disk
//! - flush, reset and apply requests with replies
//! - shutdown saving pending state
//!
//! Run with: `cargo test --test control_loop_integration`

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use smartfan::config::{ControllerConfig, LearningSaveConfig};
use smartfan::controller::SensorSample;
use smartfan::decision::Zone;
use smartfan::fan_mode::{FanMode, FanModeLadder};
use smartfan::learning::ResetScope;
use smartfan::service::{FanCommand, FanControlService, FlushReport, ServiceError, ServiceEvent};
use smartfan::store::{FileLearningStore, LearningStore, SharedLearningStore};

const ENTITY: &str = "climate.living_room";

// ============================================================================
// Helper Functions
// ============================================================================

fn ladder() -> FanModeLadder {
    FanModeLadder::from_entity_modes(&["auto", "low", "medium", "high", "turbo"]).unwrap()
}

struct Harness {
    events: mpsc::Sender<ServiceEvent>,
    commands: mpsc::Receiver<FanCommand>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<FlushReport>,
}

fn start(store: SharedLearningStore) -> Harness {
    let (command_tx, commands) = mpsc::channel(16);
    let mut service = FanControlService::new(store, LearningSaveConfig::default(), command_tx);
    service
        .register(ENTITY, ControllerConfig::default(), ladder())
        .unwrap();

    let (events, event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(service.run(event_rx, cancel.clone()));
    Harness {
        events,
        commands,
        cancel,
        handle,
    }
}

async fn send_sample(harness: &Harness, sample: SensorSample) {
    harness
        .events
        .send(ServiceEvent::Sample {
            entity_id: ENTITY.to_string(),
            sample,
        })
        .await
        .unwrap();
}

async fn flush(harness: &Harness) -> FlushReport {
    let (tx, rx) = oneshot::channel();
    harness
        .events
        .send(ServiceEvent::Flush { reply: Some(tx) })
        .await
        .unwrap();
    rx.await.unwrap()
}

/// A cold room warming up: emergency, then two observation periods.
async fn warm_up(harness: &Harness, start: Instant) {
    let minutes = |m: u64| start + Duration::from_secs(m * 60);
    send_sample(harness, SensorSample::new(start, 19.0, 20.0, 0.0).with_fan_mode("low")).await;
    send_sample(harness, SensorSample::new(minutes(3), 19.5, 20.0, 1.0)).await;
    send_sample(harness, SensorSample::new(minutes(6), 19.8, 20.0, 1.0)).await;
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test]
async fn test_emergency_sample_produces_fan_command() {
    let dir = tempfile::tempdir().unwrap();
    let store: SharedLearningStore = Arc::new(FileLearningStore::new(dir.path()));
    let mut harness = start(store);

    send_sample(
        &harness,
        SensorSample::new(Instant::now(), 19.0, 20.0, 0.0).with_fan_mode("low"),
    )
    .await;

    let command = tokio::time::timeout(Duration::from_secs(5), harness.commands.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(command.entity_id, ENTITY);
    assert_eq!(command.fan_mode, FanMode::from("turbo"));
    assert_eq!(command.zone, Zone::Emergency);

    harness.cancel.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test]
async fn test_flush_writes_record_and_reload_restores_it() {
    let dir = tempfile::tempdir().unwrap();
    let file_store = Arc::new(FileLearningStore::new(dir.path()));
    let harness = start(file_store.clone());

    warm_up(&harness, Instant::now()).await;
    assert_eq!(flush(&harness).await, FlushReport { saved: 1, failed: 0 });
    // Nothing changed since the last save.
    assert_eq!(flush(&harness).await, FlushReport::default());

    harness.cancel.cancel();
    harness.handle.await.unwrap();

    assert!(file_store.path_for(ENTITY).exists());
    let state = file_store.try_load(ENTITY).unwrap().unwrap();
    assert_eq!(state.metadata.total_decisions, 2);
    assert!(state.metadata.last_saved.is_some());
    assert!(state.profile(&FanMode::from("turbo")).is_some());

    // A new service picks up where the old one stopped.
    let (command_tx, _commands) = mpsc::channel(16);
    let mut service =
        FanControlService::new(file_store.clone(), LearningSaveConfig::default(), command_tx);
    service
        .register(ENTITY, ControllerConfig::default(), ladder())
        .unwrap();
    let learning = service.controller(ENTITY).unwrap().learning();
    assert_eq!(learning.state(), &state);
    assert!(!learning.is_dirty());
}

#[tokio::test]
async fn test_shutdown_saves_pending_state() {
    let dir = tempfile::tempdir().unwrap();
    let file_store = Arc::new(FileLearningStore::new(dir.path()));
    let harness = start(file_store.clone());

    warm_up(&harness, Instant::now()).await;
    // Round-trip a request so every sample has been processed.
    let (tx, rx) = oneshot::channel();
    harness
        .events
        .send(ServiceEvent::ResetLearning {
            entity_id: ENTITY.to_string(),
            scope: ResetScope::FanMode(FanMode::from("medium")),
            reply: Some(tx),
        })
        .await
        .unwrap();
    assert!(!rx.await.unwrap().unwrap());

    harness.cancel.cancel();
    let report = harness.handle.await.unwrap();
    assert_eq!(report, FlushReport { saved: 1, failed: 0 });

    let state = file_store.try_load(ENTITY).unwrap().unwrap();
    assert_eq!(state.metadata.total_decisions, 2);
}

#[tokio::test]
async fn test_closed_event_channel_stops_service() {
    let dir = tempfile::tempdir().unwrap();
    let file_store = Arc::new(FileLearningStore::new(dir.path()));
    let harness = start(file_store.clone());

    warm_up(&harness, Instant::now()).await;
    let Harness {
        events, handle, ..
    } = harness;
    drop(events);

    let report = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.saved, 1);
    assert!(file_store.path_for(ENTITY).exists());
}

#[tokio::test]
async fn test_apply_learned_settings_refused_without_confidence() {
    let dir = tempfile::tempdir().unwrap();
    let store: SharedLearningStore = Arc::new(FileLearningStore::new(dir.path()));
    let harness = start(store);

    warm_up(&harness, Instant::now()).await;
    let (tx, rx) = oneshot::channel();
    harness
        .events
        .send(ServiceEvent::ApplyLearnedSettings {
            entity_id: ENTITY.to_string(),
            reply: Some(tx),
        })
        .await
        .unwrap();

    let result = rx.await.unwrap();
    assert!(matches!(
        result,
        Err(ServiceError::InsufficientConfidence { .. })
    ));

    harness.cancel.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test]
async fn test_full_reset_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let file_store = Arc::new(FileLearningStore::new(dir.path()));
    let harness = start(file_store.clone());

    warm_up(&harness, Instant::now()).await;
    let (tx, rx) = oneshot::channel();
    harness
        .events
        .send(ServiceEvent::ResetLearning {
            entity_id: ENTITY.to_string(),
            scope: ResetScope::All,
            reply: Some(tx),
        })
        .await
        .unwrap();
    assert!(rx.await.unwrap().unwrap());

    let state = file_store.try_load(ENTITY).unwrap().unwrap();
    assert_eq!(state.metadata.total_decisions, 0);
    assert!(state.fan_mode_profiles.is_empty());

    harness.cancel.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test]
async fn test_unknown_entity_does_not_stop_service() {
    let dir = tempfile::tempdir().unwrap();
    let store: SharedLearningStore = Arc::new(FileLearningStore::new(dir.path()));
    let mut harness = start(store);

    harness
        .events
        .send(ServiceEvent::Sample {
            entity_id: "climate.unknown".to_string(),
            sample: SensorSample::new(Instant::now(), 19.0, 20.0, 0.0),
        })
        .await
        .unwrap();
    send_sample(
        &harness,
        SensorSample::new(Instant::now(), 19.0, 20.0, 0.0).with_fan_mode("low"),
    )
    .await;

    let command = tokio::time::timeout(Duration::from_secs(5), harness.commands.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(command.entity_id, ENTITY);

    harness.cancel.cancel();
    harness.handle.await.unwrap();
}
