//! Entity registry and service loop.
//!
//! The [`FanControlService`] owns one [`Controller`] per climate entity and
//! the shared [`LearningStore`](crate::store::LearningStore). It is the only
//! place learning state is persisted:
//!
//! - on the periodic save timer
//! - after every N observed decisions, when configured
//! - after a learning reset
//! - on shutdown
//!
//! Failed saves leave the state dirty; the next trigger retries them.
//!
//! # Example
//!
//! ```ignore
//! let (command_tx, mut command_rx) = mpsc::channel(16);
//! let mut service = FanControlService::new(store, LearningSaveConfig::default(), command_tx);
//! service.register("climate.living_room", config, ladder)?;
//!
//! let (event_tx, event_rx) = mpsc::channel(64);
//! let cancel = CancellationToken::new();
//! tokio::spawn(service.run(event_rx, cancel.clone()));
//! ```

mod error;
mod events;

pub use error::ServiceError;
pub use events::{FanCommand, FlushReport, ServiceEvent};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, LearningSaveConfig};
use crate::controller::{Controller, CycleReport, SensorSample};
use crate::error::ControlError;
use crate::fan_mode::{FanMode, FanModeLadder};
use crate::learning::{AdaptiveLearningEngine, LearningSummary, ResetScope};
use crate::learning::blend::CONFIDENCE_THRESHOLD_LOW;
use crate::store::SharedLearningStore;

/// Runs the controllers of all registered entities.
pub struct FanControlService {
    store: SharedLearningStore,
    save_config: LearningSaveConfig,
    controllers: HashMap<String, Controller>,
    commands: mpsc::Sender<FanCommand>,
}

impl FanControlService {
    /// Create a service sending fan commands to `commands`.
    pub fn new(
        store: SharedLearningStore,
        save_config: LearningSaveConfig,
        commands: mpsc::Sender<FanCommand>,
    ) -> Self {
        let (save_config, _) = save_config.sanitize();
        Self {
            store,
            save_config,
            controllers: HashMap::new(),
            commands,
        }
    }

    /// Start controlling `entity_id`, loading its learning state.
    ///
    /// A missing or unusable record starts from defaults.
    pub fn register(
        &mut self,
        entity_id: &str,
        config: ControllerConfig,
        ladder: FanModeLadder,
    ) -> Result<(), ServiceError> {
        if self.controllers.contains_key(entity_id) {
            return Err(ServiceError::AlreadyRegistered(entity_id.to_string()));
        }
        let state = self.store.load(entity_id);
        let learning = AdaptiveLearningEngine::new(state, &config);
        let controller = Controller::new(entity_id, config, ladder, learning);
        self.controllers.insert(entity_id.to_string(), controller);
        Ok(())
    }

    /// Stop controlling `entity_id`, saving its learning state first.
    pub async fn unregister(&mut self, entity_id: &str) -> Result<(), ServiceError> {
        self.save_entity(entity_id).await?;
        self.controllers.remove(entity_id);
        info!(entity = entity_id, "Entity unregistered");
        Ok(())
    }

    pub fn controller(&self, entity_id: &str) -> Option<&Controller> {
        self.controllers.get(entity_id)
    }

    /// Registered entity ids, sorted.
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.controllers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn learning_summary(&self, entity_id: &str) -> Result<LearningSummary, ServiceError> {
        Ok(self.get(entity_id)?.learning().summary())
    }

    fn get(&self, entity_id: &str) -> Result<&Controller, ServiceError> {
        self.controllers
            .get(entity_id)
            .ok_or_else(|| ServiceError::UnknownEntity(entity_id.to_string()))
    }

    fn get_mut(&mut self, entity_id: &str) -> Result<&mut Controller, ServiceError> {
        self.controllers
            .get_mut(entity_id)
            .ok_or_else(|| ServiceError::UnknownEntity(entity_id.to_string()))
    }

    /// Run one decision cycle and send the resulting command, if any.
    pub async fn handle_sample(
        &mut self,
        entity_id: &str,
        sample: &SensorSample,
    ) -> Result<CycleReport, ServiceError> {
        let report = self.get_mut(entity_id)?.cycle(sample)?;

        if let Some(fan_mode) = &report.command {
            let command = FanCommand {
                entity_id: entity_id.to_string(),
                fan_mode: fan_mode.clone(),
                zone: report.decision.zone,
                reason: report.decision.reason.clone(),
            };
            if self.commands.send(command).await.is_err() {
                warn!(entity = entity_id, "Fan command receiver closed");
            }
        }

        let every = self.save_config.save_every_decisions;
        if every > 0 && self.get(entity_id)?.learning().decisions_since_save() >= every {
            if let Err(e) = self.save_entity(entity_id).await {
                warn!(entity = entity_id, error = %e, "Save after decisions failed");
            }
        }

        Ok(report)
    }

    /// Record a fan-mode change made outside the controller.
    pub fn handle_manual_change(
        &mut self,
        entity_id: &str,
        fan_mode: FanMode,
        at: std::time::Instant,
    ) -> Result<(), ServiceError> {
        self.get_mut(entity_id)?.on_manual_fan_change(fan_mode, at);
        Ok(())
    }

    /// Promote the learned parameters of `entity_id` to its static
    /// configuration and rebuild its controller.
    ///
    /// The learning state carries over unchanged. Returns the new
    /// configuration so the caller can persist it.
    pub fn apply_learned_settings(
        &mut self,
        entity_id: &str,
    ) -> Result<ControllerConfig, ServiceError> {
        let controller = self.get(entity_id)?;
        let learning = controller.learning();
        let confidence = learning.confidence();
        if confidence < CONFIDENCE_THRESHOLD_LOW {
            return Err(ServiceError::InsufficientConfidence {
                entity_id: entity_id.to_string(),
                confidence,
                required: CONFIDENCE_THRESHOLD_LOW,
            });
        }
        let promoted = learning
            .promote_learned()
            .ok_or_else(|| ServiceError::NothingLearned(entity_id.to_string()))?;
        let (config, _) = controller.config().with_parameters(&promoted).sanitize();

        let controller = self
            .controllers
            .remove(entity_id)
            .ok_or_else(|| ServiceError::UnknownEntity(entity_id.to_string()))?;
        let ladder = controller.ladder().clone();
        let rebuilt = Controller::new(entity_id, config.clone(), ladder, controller.into_learning());
        self.controllers.insert(entity_id.to_string(), rebuilt);

        info!(
            entity = entity_id,
            deadband = config.deadband,
            soft_error = config.soft_error,
            hard_error = config.hard_error,
            min_interval = config.min_interval_minutes,
            projected_error_threshold = config.projected_error_threshold,
            "Applied learned settings"
        );
        Ok(config)
    }

    /// Clear learned data for `entity_id` and persist the result.
    ///
    /// Returns whether anything was cleared.
    pub async fn reset_learning(
        &mut self,
        entity_id: &str,
        scope: &ResetScope,
    ) -> Result<bool, ServiceError> {
        let changed = self.get_mut(entity_id)?.learning_mut().reset(scope);
        if changed {
            self.save_entity(entity_id).await?;
        }
        Ok(changed)
    }

    /// Save the learning state of `entity_id` if it has unsaved changes.
    ///
    /// Returns whether a save happened.
    pub async fn save_entity(&mut self, entity_id: &str) -> Result<bool, ServiceError> {
        let controller = self.get(entity_id)?;
        if !controller.learning().is_dirty() {
            return Ok(false);
        }
        let snapshot = controller.learning().snapshot_for_save();

        let store = Arc::clone(&self.store);
        let id = entity_id.to_string();
        let (snapshot, result) = tokio::task::spawn_blocking(move || {
            let result = store.save(&id, &snapshot);
            (snapshot, result)
        })
        .await
        .map_err(|e| ServiceError::TaskFailed(e.to_string()))?;
        result?;

        self.get_mut(entity_id)?.learning_mut().mark_saved(&snapshot);
        debug!(entity = entity_id, "Learning state persisted");
        Ok(true)
    }

    /// Save every dirty learning state.
    pub async fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        for entity_id in self.entity_ids() {
            match self.save_entity(&entity_id).await {
                Ok(true) => report.saved += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(entity = %entity_id, error = %e, "Failed to save learning state, will retry");
                }
            }
        }
        if report.saved > 0 || report.failed > 0 {
            info!(saved = report.saved, failed = report.failed, "Learning states flushed");
        }
        report
    }

    async fn handle_event(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::Sample { entity_id, sample } => {
                match self.handle_sample(&entity_id, &sample).await {
                    Ok(_) => {}
                    Err(ServiceError::Control(ControlError::InsufficientData(what))) => {
                        debug!(entity = %entity_id, missing = what, "Holding fan mode");
                    }
                    Err(e) => warn!(entity = %entity_id, error = %e, "Decision cycle failed"),
                }
            }
            ServiceEvent::ManualFanChange {
                entity_id,
                fan_mode,
                at,
            } => {
                if let Err(e) = self.handle_manual_change(&entity_id, fan_mode, at) {
                    warn!(entity = %entity_id, error = %e, "Manual change ignored");
                }
            }
            ServiceEvent::ApplyLearnedSettings { entity_id, reply } => {
                let result = self.apply_learned_settings(&entity_id);
                if let Err(e) = &result {
                    warn!(entity = %entity_id, error = %e, "Apply learned settings refused");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            ServiceEvent::ResetLearning {
                entity_id,
                scope,
                reply,
            } => {
                let result = self.reset_learning(&entity_id, &scope).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            ServiceEvent::Flush { reply } => {
                let report = self.flush().await;
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
        }
    }

    /// Process events until cancelled or the event channel closes, then save
    /// all pending learning state.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ServiceEvent>,
        cancellation_token: CancellationToken,
    ) -> FlushReport {
        info!(
            entities = self.controllers.len(),
            save_interval_minutes = self.save_config.save_interval_minutes,
            "Fan control service started"
        );

        let mut save_timer = tokio::time::interval(self.save_config.save_interval());
        save_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        save_timer.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                _ = save_timer.tick() => {
                    self.flush().await;
                }

                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                }
            }
        }

        let report = self.flush().await;
        info!(saved = report.saved, failed = report.failed, "Fan control service stopped");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryLearningStore, LearningStore};
    use std::time::{Duration, Instant};

    fn ladder() -> FanModeLadder {
        FanModeLadder::new(["low", "medium", "high", "turbo"]).unwrap()
    }

    fn service(
        store: Arc<InMemoryLearningStore>,
        save_every: u64,
    ) -> (FanControlService, mpsc::Receiver<FanCommand>) {
        let (tx, rx) = mpsc::channel(16);
        let save_config = LearningSaveConfig {
            save_every_decisions: save_every,
            ..Default::default()
        };
        let mut service = FanControlService::new(store, save_config, tx);
        service
            .register("climate.test", ControllerConfig::default(), ladder())
            .unwrap();
        (service, rx)
    }

    /// Feed `count` samples three minutes apart, each closing an observation.
    async fn feed(service: &mut FanControlService, start: Instant, count: u32) {
        for i in 0..count {
            let at = start + Duration::from_secs(180) * i;
            let sample = SensorSample::new(at, 19.9, 20.0, 0.0).with_fan_mode("medium");
            service.handle_sample("climate.test", &sample).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_command_sent_on_change() {
        let store = Arc::new(InMemoryLearningStore::new());
        let (mut service, mut rx) = service(store, 0);

        let sample = SensorSample::new(Instant::now(), 19.0, 20.0, 0.0).with_fan_mode("low");
        service.handle_sample("climate.test", &sample).await.unwrap();

        let command = rx.try_recv().unwrap();
        assert_eq!(command.fan_mode, FanMode::from("turbo"));
        assert_eq!(command.zone, crate::decision::Zone::Emergency);
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let store = Arc::new(InMemoryLearningStore::new());
        let (mut service, _rx) = service(store, 0);
        let err = service
            .register("climate.test", ControllerConfig::default(), ladder())
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn test_save_every_n_decisions() {
        let store = Arc::new(InMemoryLearningStore::new());
        let (mut service, _rx) = service(Arc::clone(&store), 3);

        feed(&mut service, Instant::now(), 4).await;
        assert_eq!(store.save_count(), 1);
        assert!(store.contains("climate.test"));
    }

    #[tokio::test]
    async fn test_failed_save_stays_dirty_and_retries() {
        let store = Arc::new(InMemoryLearningStore::new());
        let (mut service, _rx) = service(Arc::clone(&store), 0);
        feed(&mut service, Instant::now(), 2).await;

        store.set_fail_writes(true);
        assert_eq!(service.flush().await, FlushReport { saved: 0, failed: 1 });
        assert!(service.controller("climate.test").unwrap().learning().is_dirty());

        store.set_fail_writes(false);
        assert_eq!(service.flush().await, FlushReport { saved: 1, failed: 0 });
        assert!(!service.controller("climate.test").unwrap().learning().is_dirty());
    }

    #[tokio::test]
    async fn test_apply_requires_confidence() {
        let store = Arc::new(InMemoryLearningStore::new());
        let (mut service, _rx) = service(store, 0);
        let err = service.apply_learned_settings("climate.test").unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientConfidence { .. }));
    }

    #[tokio::test]
    async fn test_apply_keeps_learning_state() {
        let store = Arc::new(InMemoryLearningStore::new());
        let (mut service, _rx) = service(store, 0);
        feed(&mut service, Instant::now(), 41).await;

        let before = service
            .controller("climate.test")
            .unwrap()
            .learning()
            .state()
            .clone();
        let config = service.apply_learned_settings("climate.test").unwrap();
        let controller = service.controller("climate.test").unwrap();

        assert_eq!(controller.config(), &config);
        assert_eq!(controller.learning().state(), &before);
        assert!(config.hard_error >= config.soft_error);
    }

    #[tokio::test]
    async fn test_reset_persists() {
        let store = Arc::new(InMemoryLearningStore::new());
        let (mut service, _rx) = service(Arc::clone(&store), 0);
        feed(&mut service, Instant::now(), 3).await;

        assert!(service
            .reset_learning("climate.test", &ResetScope::All)
            .await
            .unwrap());
        let stored = store.try_load("climate.test").unwrap().unwrap();
        assert_eq!(stored.metadata.total_decisions, 0);
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let store = Arc::new(InMemoryLearningStore::new());
        let (mut service, _rx) = service(store, 0);
        let sample = SensorSample::new(Instant::now(), 19.0, 20.0, 0.0);
        let err = service.handle_sample("climate.nope", &sample).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownEntity(_)));
    }
}
