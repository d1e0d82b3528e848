// ── Unit state and snapshot types ──
//
// `CmsiState` is the single authoritative evacuation state. The rest of
// the snapshot projects the outputs, acknowledgement and device sets the
// state machine maintains alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::{AutomaticDetector, ManualCallPoint};
use super::zone::ZoneId;
use crate::config::DomainConfig;

/// Evacuation state of the unit. Exactly one variant is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CmsiState {
    /// Resting state, no alarm.
    Idle,
    /// A manual call point is latched; evacuation fires at `deadline`
    /// unless the process is acknowledged first.
    EvacPending {
        zone_id: ZoneId,
        deadline: DateTime<Utc>,
    },
    /// General evacuation in progress.
    EvacActive {
        manual: bool,
        started_at: DateTime<Utc>,
        zone_id: Option<ZoneId>,
    },
    /// Acknowledgement froze the countdown. `remaining_ms` was captured
    /// when the acknowledgement arrived and never counts down again.
    EvacSuspended {
        zone_id: ZoneId,
        deadline: DateTime<Utc>,
        remaining_ms: u64,
    },
    /// Evacuation stopped by an operator, awaiting a system reset.
    SafeHold { entered_at: DateTime<Utc> },
}

impl CmsiState {
    /// Short, stable label used in logs and tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::EvacPending { .. } => "EVAC_PENDING",
            Self::EvacActive { .. } => "EVAC_ACTIVE",
            Self::EvacSuspended { .. } => "EVAC_SUSPENDED",
            Self::SafeHold { .. } => "SAFE_HOLD",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_evacuating(&self) -> bool {
        matches!(self, Self::EvacActive { .. })
    }

    /// Zone driving the current state, when there is one.
    pub fn zone_id(&self) -> Option<&ZoneId> {
        match self {
            Self::EvacPending { zone_id, .. } | Self::EvacSuspended { zone_id, .. } => Some(zone_id),
            Self::EvacActive { zone_id, .. } => zone_id.as_ref(),
            Self::Idle | Self::SafeHold { .. } => None,
        }
    }
}

/// Operator acknowledgement of the alarm process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessAcknowledgement {
    pub is_acked: bool,
    pub acked_by: Option<String>,
    pub acked_at: Option<DateTime<Utc>>,
    pub cleared_at: Option<DateTime<Utc>>,
}

/// Diffusion (UGA), actuator (DAS) and audible outputs of the unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct AlarmOutputs {
    /// General evacuation tone on the diffusion units.
    pub evacuation_audible: bool,
    /// Local pre-alarm buzzer on the unit itself.
    pub local_audible: bool,
    pub uga_active: bool,
    pub das_applied: bool,
    /// Evacuation was forced by an operator rather than a deadline.
    pub manual_evacuation: bool,
}

/// Full projection of the unit, published after every mutating command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmsiSnapshot {
    /// Monotonic counter, bumped on every published change.
    pub revision: u64,
    pub taken_at: DateTime<Utc>,
    pub state: CmsiState,
    pub outputs: AlarmOutputs,
    pub acknowledgement: ProcessAcknowledgement,
    /// Latched manual call points, ordered by zone.
    pub manual_call_points: Vec<ManualCallPoint>,
    /// Active automatic detectors, ordered by zone.
    pub detectors: Vec<AutomaticDetector>,
    pub config: DomainConfig,
}

impl CmsiSnapshot {
    pub(crate) fn initial(config: DomainConfig) -> Self {
        Self {
            revision: 0,
            taken_at: Utc::now(),
            state: CmsiState::Idle,
            outputs: AlarmOutputs::default(),
            acknowledgement: ProcessAcknowledgement::default(),
            manual_call_points: Vec::new(),
            detectors: Vec::new(),
            config,
        }
    }

    pub fn is_latched(&self, zone: &ZoneId) -> bool {
        self.manual_call_points
            .iter()
            .any(|dm| dm.is_latched && dm.zone_id == *zone)
    }

    pub fn is_detector_active(&self, zone: &ZoneId) -> bool {
        self.detectors
            .iter()
            .any(|dai| dai.is_active && dai.zone_id == *zone)
    }
}
