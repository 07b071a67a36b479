//! Messages in and out of the service loop.

use std::time::Instant;

use tokio::sync::oneshot;

use super::ServiceError;
use crate::config::ControllerConfig;
use crate::controller::SensorSample;
use crate::decision::Zone;
use crate::fan_mode::FanMode;
use crate::learning::ResetScope;

/// Inbound event for [`FanControlService::run`](super::FanControlService::run).
#[derive(Debug)]
pub enum ServiceEvent {
    /// New sensor reading for an entity.
    Sample {
        entity_id: String,
        sample: SensorSample,
    },

    /// The fan mode was changed outside the controller.
    ManualFanChange {
        entity_id: String,
        fan_mode: FanMode,
        at: Instant,
    },

    /// Promote learned parameters to static defaults and rebuild the
    /// controller. Replies with the new configuration.
    ApplyLearnedSettings {
        entity_id: String,
        reply: Option<oneshot::Sender<Result<ControllerConfig, ServiceError>>>,
    },

    /// Clear learned data and persist the result. Replies with whether
    /// anything was cleared.
    ResetLearning {
        entity_id: String,
        scope: ResetScope,
        reply: Option<oneshot::Sender<Result<bool, ServiceError>>>,
    },

    /// Save every dirty learning state now.
    Flush {
        reply: Option<oneshot::Sender<FlushReport>>,
    },
}

/// Outbound fan-mode command.
#[derive(Debug, Clone, PartialEq)]
pub struct FanCommand {
    pub entity_id: String,
    pub fan_mode: FanMode,
    pub zone: Zone,
    pub reason: String,
}

/// Result of saving dirty learning states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: usize,
    pub failed: usize,
}
