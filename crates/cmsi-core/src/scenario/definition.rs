// ── Scenario definitions ──
//
// The scripted exercise as authored by a trainer. Field names follow the
// camelCase wire shape scenario files are written in.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::CoreError;
use crate::model::{DeviceKind, ZoneId};

/// A complete training scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
    /// Zones the trainee may reset directly while the scenario runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_reset: Option<ManualResetPolicy>,
    /// Device id to zone mapping used to expand sequence steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<BTreeMap<String, TopologyDevice>>,
}

/// Per device kind allow-list of manually resettable zones. An absent list
/// leaves that kind unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualResetPolicy {
    #[serde(default, alias = "DM", skip_serializing_if = "Option::is_none")]
    pub dm: Option<Vec<ZoneId>>,
    #[serde(default, alias = "DAI", skip_serializing_if = "Option::is_none")]
    pub dai: Option<Vec<ZoneId>>,
}

impl ManualResetPolicy {
    pub fn allows(&self, kind: DeviceKind, zone: &ZoneId) -> bool {
        let list = match kind {
            DeviceKind::ManualCallPoint => self.dm.as_ref(),
            DeviceKind::AutomaticDetector => self.dai.as_ref(),
        };
        list.is_none_or(|zones| zones.contains(zone))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyDevice {
    pub kind: DeviceKind,
    pub zone_id: ZoneId,
}

/// One scripted action at `offset` seconds from scenario start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub offset: f64,
    #[serde(flatten)]
    pub action: ScenarioAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence: Vec<SequenceStep>,
}

impl ScenarioEvent {
    /// Human-facing name: label, then id, then the action tag.
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| self.action.tag().to_owned())
    }
}

/// Fire the parent event's action against `device_id`'s zone, `delay`
/// seconds after the parent's offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStep {
    pub device_id: String,
    #[serde(default)]
    pub delay: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioAction {
    DmTrigger {
        #[serde(rename = "zoneId")]
        zone_id: ZoneId,
    },
    DmReset {
        #[serde(rename = "zoneId")]
        zone_id: ZoneId,
    },
    DaiTrigger {
        #[serde(rename = "zoneId")]
        zone_id: ZoneId,
    },
    DaiReset {
        #[serde(rename = "zoneId")]
        zone_id: ZoneId,
    },
    ManualEvacStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ManualEvacStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ProcessAck {
        #[serde(default, rename = "ackedBy", skip_serializing_if = "Option::is_none")]
        acked_by: Option<String>,
    },
    ProcessClear,
    SystemReset,
}

impl ScenarioAction {
    /// Wire tag, as written in scenario files.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::DmTrigger { .. } => "DM_TRIGGER",
            Self::DmReset { .. } => "DM_RESET",
            Self::DaiTrigger { .. } => "DAI_TRIGGER",
            Self::DaiReset { .. } => "DAI_RESET",
            Self::ManualEvacStart { .. } => "MANUAL_EVAC_START",
            Self::ManualEvacStop { .. } => "MANUAL_EVAC_STOP",
            Self::ProcessAck { .. } => "PROCESS_ACK",
            Self::ProcessClear => "PROCESS_CLEAR",
            Self::SystemReset => "SYSTEM_RESET",
        }
    }

    /// Device class a zone-typed action targets.
    pub fn device_kind(&self) -> Option<DeviceKind> {
        match self {
            Self::DmTrigger { .. } | Self::DmReset { .. } => Some(DeviceKind::ManualCallPoint),
            Self::DaiTrigger { .. } | Self::DaiReset { .. } => Some(DeviceKind::AutomaticDetector),
            _ => None,
        }
    }

    pub fn zone_id(&self) -> Option<&ZoneId> {
        match self {
            Self::DmTrigger { zone_id }
            | Self::DmReset { zone_id }
            | Self::DaiTrigger { zone_id }
            | Self::DaiReset { zone_id } => Some(zone_id),
            _ => None,
        }
    }

    /// `(kind, zone)` pair for zone-typed actions.
    pub fn device_target(&self) -> Option<(DeviceKind, &ZoneId)> {
        Some((self.device_kind()?, self.zone_id()?))
    }

    /// Same action against another zone. `None` for actions without a zone.
    pub fn with_zone(&self, zone_id: ZoneId) -> Option<Self> {
        match self {
            Self::DmTrigger { .. } => Some(Self::DmTrigger { zone_id }),
            Self::DmReset { .. } => Some(Self::DmReset { zone_id }),
            Self::DaiTrigger { .. } => Some(Self::DaiTrigger { zone_id }),
            Self::DaiReset { .. } => Some(Self::DaiReset { zone_id }),
            _ => None,
        }
    }

    /// Core command for this action. `SYSTEM_RESET` has none: the script
    /// only waits for the trainee to reset the unit.
    pub fn to_command(&self) -> Option<Command> {
        let cmd = match self {
            Self::DmTrigger { zone_id } => Command::ActivateManualCallPoint {
                zone_id: zone_id.clone(),
            },
            Self::DmReset { zone_id } => Command::ResetManualCallPoint {
                zone_id: zone_id.clone(),
            },
            Self::DaiTrigger { zone_id } => Command::ActivateAutomaticDetector {
                zone_id: zone_id.clone(),
            },
            Self::DaiReset { zone_id } => Command::ResetAutomaticDetector {
                zone_id: zone_id.clone(),
            },
            Self::ManualEvacStart { reason } => Command::StartManualEvacuation {
                reason: reason.clone(),
            },
            Self::ManualEvacStop { reason } => Command::StopManualEvacuation {
                reason: reason.clone(),
            },
            Self::ProcessAck { acked_by } => Command::AcknowledgeProcess {
                acked_by: acked_by.clone(),
            },
            Self::ProcessClear => Command::ClearProcessAcknowledgement,
            Self::SystemReset => return None,
        };
        Some(cmd)
    }
}

impl ScenarioDefinition {
    /// Structural checks a scenario file must pass before it can run.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: String| CoreError::InvalidScenario {
            scenario: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("scenario id is empty".into()));
        }
        for (index, event) in self.events.iter().enumerate() {
            if !event.offset.is_finite() || event.offset < 0.0 {
                return Err(invalid(format!(
                    "event #{index} has invalid offset {}",
                    event.offset
                )));
            }
            if event.action.zone_id().is_some_and(ZoneId::is_blank) {
                return Err(invalid(format!("event #{index} has a blank zone id")));
            }
            for step in &event.sequence {
                if !step.delay.is_finite() || step.delay < 0.0 {
                    return Err(invalid(format!(
                        "event #{index} step '{}' has invalid delay {}",
                        step.device_id, step.delay
                    )));
                }
            }
        }
        if let Some(topology) = &self.topology {
            if let Some((device, _)) = topology.iter().find(|(_, d)| d.zone_id.is_blank()) {
                return Err(invalid(format!("device '{device}' has a blank zone id")));
            }
        }
        Ok(())
    }

    /// Device id to `(kind, zone)` lookup built from the topology.
    pub fn device_lookup(&self) -> HashMap<String, TopologyDevice> {
        self.topology
            .iter()
            .flatten()
            .map(|(id, device)| (id.clone(), device.clone()))
            .collect()
    }

    /// Whether `zone` may be reset directly while this scenario runs.
    pub fn can_manually_reset(&self, kind: DeviceKind, zone: &ZoneId) -> bool {
        self.manual_reset
            .as_ref()
            .is_none_or(|policy| policy.allows(kind, zone))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn sample() -> serde_json::Value {
        json!({
            "id": "drill-1",
            "name": "Stairwell drill",
            "events": [
                { "type": "DM_TRIGGER", "zoneId": "ZF1", "offset": 0 },
                { "type": "PROCESS_ACK", "ackedBy": "trainee", "offset": 2.5 },
                { "type": "SYSTEM_RESET", "offset": 10, "label": "Reset point" }
            ],
            "manualReset": { "DM": ["ZF1"] },
            "topology": {
                "dm-a": { "kind": "DM", "zoneId": "ZF2" }
            }
        })
    }

    #[test]
    fn parses_camel_case_wire_shape() {
        let scenario: ScenarioDefinition = serde_json::from_value(sample()).unwrap();
        assert_eq!(scenario.events.len(), 3);
        assert_eq!(
            scenario.events[0].action,
            ScenarioAction::DmTrigger {
                zone_id: ZoneId::new("ZF1")
            }
        );
        assert_eq!(
            scenario.events[1].action,
            ScenarioAction::ProcessAck {
                acked_by: Some("trainee".into())
            }
        );
        assert_eq!(scenario.events[2].display_name(), "Reset point");
        assert_eq!(
            scenario.device_lookup()["dm-a"].kind,
            DeviceKind::ManualCallPoint
        );
        scenario.validate().unwrap();
    }

    #[test]
    fn manual_reset_allow_list() {
        let scenario: ScenarioDefinition = serde_json::from_value(sample()).unwrap();
        assert!(scenario.can_manually_reset(DeviceKind::ManualCallPoint, &ZoneId::new("ZF1")));
        assert!(!scenario.can_manually_reset(DeviceKind::ManualCallPoint, &ZoneId::new("ZF9")));
        // No DAI list: unconstrained.
        assert!(scenario.can_manually_reset(DeviceKind::AutomaticDetector, &ZoneId::new("ZF9")));
    }

    #[test]
    fn rejects_negative_offsets() {
        let mut scenario: ScenarioDefinition = serde_json::from_value(sample()).unwrap();
        scenario.events[0].offset = -1.0;
        assert!(matches!(
            scenario.validate(),
            Err(CoreError::InvalidScenario { .. })
        ));
    }

    #[test]
    fn system_reset_has_no_command() {
        assert!(ScenarioAction::SystemReset.to_command().is_none());
        assert_eq!(
            ScenarioAction::ProcessClear.to_command(),
            Some(Command::ClearProcessAcknowledgement)
        );
    }
}
