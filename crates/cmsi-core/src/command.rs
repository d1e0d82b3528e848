// ── Command API ──
//
// Every mutation of the unit can be expressed as a `Command`. The
// scenario runner and CLI route commands through
// `EvacuationCore::execute`; embedding code may equally call the typed
// methods directly.

use serde::{Deserialize, Serialize};

use crate::config::DomainConfigPatch;
use crate::error::ResetRejected;
use crate::model::ZoneId;

/// All possible write operations against the evacuation core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    // ── Manual call points ───────────────────────────────────────────
    ActivateManualCallPoint { zone_id: ZoneId },
    ResetManualCallPoint { zone_id: ZoneId },

    // ── Automatic detectors ──────────────────────────────────────────
    ActivateAutomaticDetector { zone_id: ZoneId },
    ResetAutomaticDetector { zone_id: ZoneId },

    // ── Process ──────────────────────────────────────────────────────
    AcknowledgeProcess { acked_by: Option<String> },
    ClearProcessAcknowledgement,
    SilenceAudibleAlarm,

    // ── Evacuation ───────────────────────────────────────────────────
    StartManualEvacuation { reason: Option<String> },
    StopManualEvacuation { reason: Option<String> },
    TrySystemReset,

    // ── Configuration ────────────────────────────────────────────────
    UpdateConfig(DomainConfigPatch),
}

impl Command {
    /// Short name used in tracing fields and skipped-step log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ActivateManualCallPoint { .. } => "activate_manual_call_point",
            Self::ResetManualCallPoint { .. } => "reset_manual_call_point",
            Self::ActivateAutomaticDetector { .. } => "activate_automatic_detector",
            Self::ResetAutomaticDetector { .. } => "reset_automatic_detector",
            Self::AcknowledgeProcess { .. } => "acknowledge_process",
            Self::ClearProcessAcknowledgement => "clear_process_acknowledgement",
            Self::SilenceAudibleAlarm => "silence_audible_alarm",
            Self::StartManualEvacuation { .. } => "start_manual_evacuation",
            Self::StopManualEvacuation { .. } => "stop_manual_evacuation",
            Self::TrySystemReset => "try_system_reset",
            Self::UpdateConfig(_) => "update_config",
        }
    }
}

/// Result of a successfully routed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    Ok,
    /// `TrySystemReset` was refused by policy.
    ResetRejected(ResetRejected),
}

impl CommandResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}
