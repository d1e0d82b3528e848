// ── Log event domain types ──
//
// The append-only journal of the unit. Distinct from `tracing` output:
// these are the events a trainer sees and an audit adapter persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subsystem or actor an event originates from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LogSource {
    #[serde(rename = "DM")]
    #[strum(to_string = "DM")]
    ManualCallPoint,
    #[serde(rename = "DAI")]
    #[strum(to_string = "DAI")]
    Detector,
    /// The control unit itself.
    #[serde(rename = "CMSI")]
    #[strum(to_string = "CMSI")]
    Unit,
    #[serde(rename = "UGA")]
    #[strum(to_string = "UGA")]
    Diffusion,
    #[serde(rename = "DAS")]
    #[strum(to_string = "DAS")]
    Actuator,
    Trainer,
    Trainee,
    ManualOperator,
}

/// Typed discriminant of a log event, matched on by observers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum LogEventKind {
    ManualCallPointActivated,
    ManualCallPointReset,
    DetectorActivated,
    DetectorReset,
    PreAlarm,
    EvacuationPending,
    EvacuationStarted,
    EvacuationSuspended,
    EvacuationStopped,
    DiffusionChanged,
    ActuatorsChanged,
    ProcessAcknowledged,
    AcknowledgementCleared,
    AudibleSilenced,
    /// The unit returned to idle after a successful reset. The scenario
    /// runner completes a run waiting on a scripted reset when it sees this.
    SystemReset,
    ResetRejected,
    ConfigUpdated,
    ScenarioAwaitingReset,
    ScenarioStepSkipped,
    ScenarioStepFailed,
    Note,
}

/// A single journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub kind: LogEventKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEvent {
    pub fn new(source: LogSource, kind: LogEventKind, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), source, kind, message)
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        source: LogSource,
        kind: LogEventKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            source,
            kind,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
