// ── Scenario timeline planning ──
//
// Flattens a scenario into an ordered list of timed steps. Sequence steps
// are validated against the scenario topology; steps that cannot be
// resolved are kept aside in `dropped` so tooling can report them.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use super::definition::{ScenarioAction, ScenarioDefinition, ScenarioEvent, TopologyDevice};

/// The expanded, time-ordered timeline of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioPlan {
    /// Events sorted by offset, declaration order kept for equal offsets.
    pub events: Vec<ScenarioEvent>,
    pub steps: Vec<PlannedStep>,
    pub dropped: Vec<DroppedStep>,
}

/// One action to dispatch `at` after scenario start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    #[serde(with = "duration_ms")]
    pub at: Duration,
    /// Index into [`ScenarioPlan::events`].
    pub event_index: usize,
    pub action: ScenarioAction,
    pub origin: StepOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOrigin {
    Event,
    Sequence { device_id: String },
}

/// A sequence step that could not be resolved against the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedStep {
    pub event_index: usize,
    pub device_id: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    UnknownDevice,
    KindMismatch,
    /// The parent action does not target a zone.
    NotZoneAction,
}

impl ScenarioPlan {
    pub fn build(scenario: &ScenarioDefinition, lookup: &HashMap<String, TopologyDevice>) -> Self {
        let mut events = scenario.events.clone();
        // `sort_by` is stable: equal offsets keep declaration order.
        events.sort_by(|a, b| a.offset.total_cmp(&b.offset));

        let mut steps = Vec::new();
        let mut dropped = Vec::new();

        for (event_index, event) in events.iter().enumerate() {
            let base = seconds(event.offset).unwrap_or_else(|| {
                warn!(
                    scenario = %scenario.id,
                    event = event_index,
                    offset = event.offset,
                    "invalid event offset, scheduling at start"
                );
                Duration::ZERO
            });

            let mut expanded = Vec::new();
            for step in &event.sequence {
                match resolve_step(&event.action, lookup.get(&step.device_id)) {
                    Ok(action) => {
                        let delay = seconds(step.delay).unwrap_or(Duration::ZERO);
                        expanded.push(PlannedStep {
                            at: base + delay,
                            event_index,
                            action,
                            origin: StepOrigin::Sequence {
                                device_id: step.device_id.clone(),
                            },
                        });
                    }
                    Err(reason) => dropped.push(DroppedStep {
                        event_index,
                        device_id: step.device_id.clone(),
                        reason,
                    }),
                }
            }

            // A validated step on the event's own zone already covers it.
            let covered = event.action.zone_id().is_some_and(|own| {
                expanded
                    .iter()
                    .any(|step| step.action.zone_id() == Some(own))
            });
            if !covered {
                steps.push(PlannedStep {
                    at: base,
                    event_index,
                    action: event.action.clone(),
                    origin: StepOrigin::Event,
                });
            }
            steps.extend(expanded);
        }

        steps.sort_by_key(|step| step.at);

        Self {
            events,
            steps,
            dropped,
        }
    }
}

fn resolve_step(
    action: &ScenarioAction,
    device: Option<&TopologyDevice>,
) -> Result<ScenarioAction, DropReason> {
    let expected = action.device_kind().ok_or(DropReason::NotZoneAction)?;
    let device = device.ok_or(DropReason::UnknownDevice)?;
    if device.kind != expected || device.zone_id.is_blank() {
        return Err(DropReason::KindMismatch);
    }
    action
        .with_zone(device.zone_id.clone())
        .ok_or(DropReason::NotZoneAction)
}

fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::ZoneId;

    fn plan(value: serde_json::Value) -> ScenarioPlan {
        let scenario: ScenarioDefinition = serde_json::from_value(value).unwrap();
        ScenarioPlan::build(&scenario, &scenario.device_lookup())
    }

    #[test]
    fn sorts_by_offset_keeping_declaration_order() {
        let plan = plan(json!({
            "id": "s", "name": "s",
            "events": [
                { "type": "PROCESS_ACK", "offset": 5 },
                { "type": "DM_TRIGGER", "zoneId": "A", "offset": 1 },
                { "type": "DM_TRIGGER", "zoneId": "B", "offset": 1 }
            ]
        }));
        let zones: Vec<_> = plan
            .steps
            .iter()
            .map(|s| s.action.zone_id().map(ZoneId::as_str))
            .collect();
        assert_eq!(zones, vec![Some("A"), Some("B"), None]);
        assert_eq!(plan.steps[2].at, Duration::from_secs(5));
    }

    #[test]
    fn sequence_expands_and_suppresses_covered_event() {
        let plan = plan(json!({
            "id": "s", "name": "s",
            "topology": {
                "dm-1": { "kind": "DM", "zoneId": "ZF1" },
                "dm-2": { "kind": "DM", "zoneId": "ZF2" }
            },
            "events": [{
                "type": "DM_TRIGGER", "zoneId": "ZF1", "offset": 2,
                "sequence": [
                    { "deviceId": "dm-1", "delay": 0 },
                    { "deviceId": "dm-2", "delay": 1.5 }
                ]
            }]
        }));
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].at, Duration::from_secs(2));
        assert_eq!(
            plan.steps[0].origin,
            StepOrigin::Sequence {
                device_id: "dm-1".into()
            }
        );
        assert_eq!(plan.steps[1].at, Duration::from_millis(3_500));
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn sequence_on_other_zones_keeps_the_event() {
        let plan = plan(json!({
            "id": "s", "name": "s",
            "topology": { "dm-2": { "kind": "DM", "zoneId": "ZF2" } },
            "events": [{
                "type": "DM_TRIGGER", "zoneId": "ZF1", "offset": 0,
                "sequence": [{ "deviceId": "dm-2", "delay": 1 }]
            }]
        }));
        let zones: Vec<_> = plan
            .steps
            .iter()
            .map(|s| s.action.zone_id().map(ZoneId::as_str))
            .collect();
        assert_eq!(zones, vec![Some("ZF1"), Some("ZF2")]);
        assert_eq!(plan.steps[0].origin, StepOrigin::Event);
    }

    #[test]
    fn unresolved_steps_are_dropped_and_event_still_fires() {
        let plan = plan(json!({
            "id": "s", "name": "s",
            "topology": { "dai-1": { "kind": "DAI", "zoneId": "ZD1" } },
            "events": [{
                "type": "DM_TRIGGER", "zoneId": "ZF1", "offset": 0,
                "sequence": [
                    { "deviceId": "dai-1", "delay": 1 },
                    { "deviceId": "ghost", "delay": 1 }
                ]
            }]
        }));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].origin, StepOrigin::Event);
        let reasons: Vec<_> = plan.dropped.iter().map(|d| d.reason).collect();
        assert_eq!(reasons, vec![DropReason::KindMismatch, DropReason::UnknownDevice]);
    }
}
