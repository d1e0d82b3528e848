// ── Core error types ──
//
// `ResetRejected` is an expected, recoverable policy outcome and is
// returned as a value. `CoreError` covers everything that genuinely
// failed; the scenario runner logs those per step and carries on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{DeviceKind, ZoneId};

/// Why `try_system_reset` refused to return the unit to idle.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetRejected {
    /// Takes priority when both device classes are outstanding.
    #[error("manual call points still latched in {}", join_zones(.zones))]
    ManualCallPointsLatched { zones: Vec<ZoneId> },

    #[error("automatic detectors still active in {}", join_zones(.zones))]
    DetectorsActive { zones: Vec<ZoneId> },
}

impl ResetRejected {
    /// Machine-readable reason code for operator-facing translation.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ManualCallPointsLatched { .. } => "MANUAL_CALL_POINTS_LATCHED",
            Self::DetectorsActive { .. } => "DETECTORS_ACTIVE",
        }
    }

    /// Device class that still needs clearing.
    pub fn device_kind(&self) -> DeviceKind {
        match self {
            Self::ManualCallPointsLatched { .. } => DeviceKind::ManualCallPoint,
            Self::DetectorsActive { .. } => DeviceKind::AutomaticDetector,
        }
    }

    pub fn zones(&self) -> &[ZoneId] {
        match self {
            Self::ManualCallPointsLatched { zones } | Self::DetectorsActive { zones } => zones,
        }
    }
}

fn join_zones(zones: &[ZoneId]) -> String {
    zones
        .iter()
        .map(ZoneId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of the out-of-service lookup injected into the scenario runner.
#[derive(Debug, Clone, Error)]
#[error("out-of-service lookup failed: {message}")]
pub struct PolicyError {
    pub message: String,
}

impl PolicyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Evacuation core has been shut down")]
    CoreShutDown,

    #[error("Invalid scenario '{scenario}': {reason}")]
    InvalidScenario { scenario: String, reason: String },
}
