// ── Evacuation state machine ──
//
// Pure transition logic. Nothing here spawns tasks or publishes; every
// operation records what happened into an `Outcome` (log events, timer
// operations, whether the snapshot changed) and the owning
// `EvacuationCore` applies it while still holding the state lock.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{DomainConfig, DomainConfigPatch};
use crate::error::ResetRejected;
use crate::model::{
    AlarmOutputs, AutomaticDetector, CmsiSnapshot, CmsiState, LogEvent, LogEventKind, LogSource,
    ManualCallPoint, ProcessAcknowledgement, ZoneId,
};

/// A reading of both clocks the machine needs: the monotonic one for
/// deadlines, the wall clock for timestamps.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    pub instant: Instant,
    pub wall: DateTime<Utc>,
}

impl Clock {
    pub(crate) fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Timer bookkeeping requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TimerOp {
    Arm {
        zone: ZoneId,
        generation: u64,
        due: Instant,
    },
    Disarm {
        zone: ZoneId,
    },
}

/// Everything a single command produced.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub events: Vec<LogEvent>,
    pub timers: Vec<TimerOp>,
    pub changed: bool,
}

impl Outcome {
    fn log(&mut self, event: LogEvent) {
        self.events.push(event);
    }
}

#[derive(Debug, Clone, Copy)]
struct ArmedDeadline {
    generation: u64,
    due: Instant,
}

pub(crate) struct Machine {
    state: CmsiState,
    outputs: AlarmOutputs,
    ack: ProcessAcknowledgement,
    manual_call_points: BTreeMap<ZoneId, ManualCallPoint>,
    detectors: BTreeMap<ZoneId, AutomaticDetector>,
    dm_last_reset: HashMap<ZoneId, DateTime<Utc>>,
    dai_last_reset: HashMap<ZoneId, DateTime<Utc>>,
    armed: HashMap<ZoneId, ArmedDeadline>,
    config: DomainConfig,
    next_generation: u64,
    revision: u64,
}

impl Machine {
    pub(crate) fn new(config: DomainConfig) -> Self {
        Self {
            state: CmsiState::Idle,
            outputs: AlarmOutputs::default(),
            ack: ProcessAcknowledgement::default(),
            manual_call_points: BTreeMap::new(),
            detectors: BTreeMap::new(),
            dm_last_reset: HashMap::new(),
            dai_last_reset: HashMap::new(),
            armed: HashMap::new(),
            config,
            next_generation: 0,
            revision: 0,
        }
    }

    pub(crate) fn state(&self) -> &CmsiState {
        &self.state
    }

    /// Project the current state, bumping the revision.
    pub(crate) fn publish(&mut self, taken_at: DateTime<Utc>) -> CmsiSnapshot {
        self.revision += 1;
        CmsiSnapshot {
            revision: self.revision,
            taken_at,
            state: self.state.clone(),
            outputs: self.outputs,
            acknowledgement: self.ack.clone(),
            manual_call_points: self.manual_call_points.values().cloned().collect(),
            detectors: self.detectors.values().cloned().collect(),
            config: self.config.clone(),
        }
    }

    // ── Manual call points ───────────────────────────────────────────

    pub(crate) fn activate_manual_call_point(
        &mut self,
        zone: &ZoneId,
        clock: Clock,
        out: &mut Outcome,
    ) {
        let last_reset = self.dm_last_reset.get(zone).copied();
        let dm = self
            .manual_call_points
            .entry(zone.clone())
            .or_insert_with(|| ManualCallPoint::new(zone.clone(), last_reset));
        dm.is_latched = true;
        dm.last_activated_at = Some(clock.wall);
        out.changed = true;
        out.log(
            LogEvent::at(
                clock.wall,
                LogSource::ManualCallPoint,
                LogEventKind::ManualCallPointActivated,
                format!("Manual call point activated in zone {zone}"),
            )
            .with_details(json!({ "zone_id": zone })),
        );

        let delay = self.config.evac_delay();
        let deadline = add_to_wall(clock.wall, delay);
        self.arm(zone, clock.instant + delay, out);
        self.outputs.local_audible = true;

        match self.state {
            CmsiState::Idle | CmsiState::EvacPending { .. } | CmsiState::SafeHold { .. } => {
                self.state = CmsiState::EvacPending {
                    zone_id: zone.clone(),
                    deadline,
                };
                out.log(
                    LogEvent::at(
                        clock.wall,
                        LogSource::Unit,
                        LogEventKind::EvacuationPending,
                        format!(
                            "Evacuation pending for zone {zone}, automatic in {} s",
                            delay.as_secs()
                        ),
                    )
                    .with_details(json!({
                        "zone_id": zone,
                        "deadline": deadline,
                        "delay_ms": self.config.evac_delay_ms,
                    })),
                );
            }
            CmsiState::EvacActive { .. } | CmsiState::EvacSuspended { .. } => {
                debug!(zone = %zone, state = self.state.label(), "call point latched, state unchanged");
            }
        }
    }

    pub(crate) fn reset_manual_call_point(&mut self, zone: &ZoneId, clock: Clock, out: &mut Outcome) {
        if self.manual_call_points.remove(zone).is_none() {
            debug!(zone = %zone, "reset of untracked manual call point ignored");
            return;
        }
        self.dm_last_reset.insert(zone.clone(), clock.wall);
        out.changed = true;
        out.log(
            LogEvent::at(
                clock.wall,
                LogSource::ManualCallPoint,
                LogEventKind::ManualCallPointReset,
                format!("Manual call point reset in zone {zone}"),
            )
            .with_details(json!({ "zone_id": zone })),
        );
    }

    // ── Automatic detectors ──────────────────────────────────────────

    pub(crate) fn activate_automatic_detector(
        &mut self,
        zone: &ZoneId,
        clock: Clock,
        out: &mut Outcome,
    ) {
        let last_reset = self.dai_last_reset.get(zone).copied();
        let dai = self
            .detectors
            .entry(zone.clone())
            .or_insert_with(|| AutomaticDetector::new(zone.clone(), last_reset));
        dai.is_active = true;
        dai.last_activated_at = Some(clock.wall);
        out.changed = true;
        out.log(
            LogEvent::at(
                clock.wall,
                LogSource::Detector,
                LogEventKind::DetectorActivated,
                format!("Automatic detector activated in zone {zone}"),
            )
            .with_details(json!({ "zone_id": zone })),
        );

        if self.config.evac_on_dai {
            match self.state {
                CmsiState::Idle | CmsiState::EvacPending { .. } | CmsiState::SafeHold { .. } => {
                    self.disarm_all(out);
                    self.enter_evacuation(false, Some(zone.clone()), LogSource::Unit, None, clock, out);
                }
                // Only a manual start, a manual stop or a reset leaves a suspension.
                CmsiState::EvacActive { .. } | CmsiState::EvacSuspended { .. } => {
                    debug!(zone = %zone, state = self.state.label(), "detector active, state unchanged");
                }
            }
        } else {
            self.outputs.local_audible = true;
            out.log(
                LogEvent::at(
                    clock.wall,
                    LogSource::Unit,
                    LogEventKind::PreAlarm,
                    format!("Local pre-alarm for zone {zone}"),
                )
                .with_details(json!({ "zone_id": zone })),
            );
        }
    }

    pub(crate) fn reset_automatic_detector(&mut self, zone: &ZoneId, clock: Clock, out: &mut Outcome) {
        if self.detectors.remove(zone).is_none() {
            debug!(zone = %zone, "reset of untracked detector ignored");
            return;
        }
        self.dai_last_reset.insert(zone.clone(), clock.wall);
        out.changed = true;
        out.log(
            LogEvent::at(
                clock.wall,
                LogSource::Detector,
                LogEventKind::DetectorReset,
                format!("Automatic detector reset in zone {zone}"),
            )
            .with_details(json!({ "zone_id": zone })),
        );
    }

    // ── Process acknowledgement ──────────────────────────────────────

    pub(crate) fn acknowledge_process(
        &mut self,
        acked_by: Option<String>,
        clock: Clock,
        out: &mut Outcome,
    ) {
        self.ack.is_acked = true;
        self.ack.acked_by.clone_from(&acked_by);
        self.ack.acked_at = Some(clock.wall);
        out.changed = true;
        out.log(
            LogEvent::at(
                clock.wall,
                LogSource::Unit,
                LogEventKind::ProcessAcknowledged,
                match &acked_by {
                    Some(who) => format!("Process acknowledged by {who}"),
                    None => "Process acknowledged".to_owned(),
                },
            )
            .with_details(json!({ "acked_by": acked_by })),
        );

        if !self.config.process_ack_required {
            return;
        }
        let CmsiState::EvacPending { zone_id, deadline } = &self.state else {
            return;
        };
        let (zone_id, deadline) = (zone_id.clone(), *deadline);

        // Frozen here, once. Nothing recomputes it from the deadline later.
        let remaining = self
            .armed
            .get(&zone_id)
            .map_or(Duration::ZERO, |armed| {
                armed.due.saturating_duration_since(clock.instant)
            });
        let remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);

        self.disarm_all(out);
        self.state = CmsiState::EvacSuspended {
            zone_id: zone_id.clone(),
            deadline,
            remaining_ms,
        };
        out.log(
            LogEvent::at(
                clock.wall,
                LogSource::Unit,
                LogEventKind::EvacuationSuspended,
                format!("Evacuation countdown for zone {zone_id} suspended with {remaining_ms} ms remaining"),
            )
            .with_details(json!({ "zone_id": zone_id, "remaining_ms": remaining_ms })),
        );
    }

    pub(crate) fn clear_process_acknowledgement(&mut self, clock: Clock, out: &mut Outcome) {
        self.ack = ProcessAcknowledgement {
            cleared_at: Some(clock.wall),
            ..ProcessAcknowledgement::default()
        };
        out.changed = true;
        out.log(LogEvent::at(
            clock.wall,
            LogSource::Unit,
            LogEventKind::AcknowledgementCleared,
            "Process acknowledgement cleared",
        ));
    }

    pub(crate) fn silence_audible_alarm(&mut self, clock: Clock, out: &mut Outcome) {
        if !self.outputs.evacuation_audible && !self.outputs.local_audible {
            return;
        }
        self.outputs.evacuation_audible = false;
        self.outputs.local_audible = false;
        out.changed = true;
        out.log(LogEvent::at(
            clock.wall,
            LogSource::Diffusion,
            LogEventKind::AudibleSilenced,
            "Audible alarm silenced",
        ));
    }

    // ── Evacuation ───────────────────────────────────────────────────

    pub(crate) fn start_manual_evacuation(
        &mut self,
        reason: Option<String>,
        clock: Clock,
        out: &mut Outcome,
    ) {
        self.disarm_all(out);
        self.enter_evacuation(true, None, LogSource::ManualOperator, reason, clock, out);
    }

    pub(crate) fn stop_manual_evacuation(
        &mut self,
        reason: Option<String>,
        clock: Clock,
        out: &mut Outcome,
    ) {
        self.disarm_all(out);
        self.state = CmsiState::SafeHold {
            entered_at: clock.wall,
        };
        self.outputs.uga_active = false;
        self.outputs.das_applied = false;
        self.outputs.evacuation_audible = false;
        self.outputs.manual_evacuation = false;
        out.changed = true;
        out.log(
            LogEvent::at(
                clock.wall,
                LogSource::ManualOperator,
                LogEventKind::EvacuationStopped,
                match &reason {
                    Some(reason) => format!("Evacuation stopped: {reason}"),
                    None => "Evacuation stopped".to_owned(),
                },
            )
            .with_details(json!({ "reason": reason })),
        );
        self.log_outputs(clock, out);
    }

    /// Deadline of `zone` elapsed. Ignored unless `generation` is still the
    /// armed one and the unit is pending on that same zone.
    pub(crate) fn deadline_elapsed(
        &mut self,
        zone: &ZoneId,
        generation: u64,
        clock: Clock,
        out: &mut Outcome,
    ) {
        match self.armed.get(zone) {
            Some(armed) if armed.generation == generation => {
                self.armed.remove(zone);
                out.timers.push(TimerOp::Disarm { zone: zone.clone() });
            }
            _ => {
                debug!(zone = %zone, generation, "stale deadline ignored");
                return;
            }
        }

        let pending_here = matches!(
            &self.state,
            CmsiState::EvacPending { zone_id, .. } if zone_id == zone
        );
        if !pending_here {
            debug!(zone = %zone, state = self.state.label(), "deadline elapsed outside its pending window");
            return;
        }
        self.enter_evacuation(false, Some(zone.clone()), LogSource::Unit, None, clock, out);
    }

    pub(crate) fn try_system_reset(
        &mut self,
        clock: Clock,
        out: &mut Outcome,
    ) -> Result<(), ResetRejected> {
        let latched: Vec<ZoneId> = self
            .manual_call_points
            .values()
            .filter(|dm| dm.is_latched)
            .map(|dm| dm.zone_id.clone())
            .collect();
        let rejection = if latched.is_empty() {
            (self.config.reset_requires_dai_clear && !self.detectors.is_empty()).then(|| {
                ResetRejected::DetectorsActive {
                    zones: self.detectors.keys().cloned().collect(),
                }
            })
        } else {
            Some(ResetRejected::ManualCallPointsLatched { zones: latched })
        };

        if let Some(rejection) = rejection {
            out.log(
                LogEvent::at(
                    clock.wall,
                    LogSource::Unit,
                    LogEventKind::ResetRejected,
                    format!("System reset refused: {rejection}"),
                )
                .with_details(json!({ "code": rejection.code(), "zones": rejection.zones() })),
            );
            return Err(rejection);
        }

        self.disarm_all(out);
        for zone in std::mem::take(&mut self.detectors).into_keys() {
            self.dai_last_reset.insert(zone, clock.wall);
        }
        self.state = CmsiState::Idle;
        self.outputs = AlarmOutputs::default();
        self.ack = ProcessAcknowledgement {
            cleared_at: Some(clock.wall),
            ..ProcessAcknowledgement::default()
        };
        out.changed = true;
        out.log(LogEvent::at(
            clock.wall,
            LogSource::Unit,
            LogEventKind::SystemReset,
            "System reset, unit back to idle",
        ));
        Ok(())
    }

    pub(crate) fn update_config(&mut self, patch: &DomainConfigPatch, clock: Clock, out: &mut Outcome) {
        self.config.merge(patch);
        out.changed = true;
        out.log(
            LogEvent::at(
                clock.wall,
                LogSource::Unit,
                LogEventKind::ConfigUpdated,
                "Configuration updated",
            )
            .with_details(json!(self.config)),
        );
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn enter_evacuation(
        &mut self,
        manual: bool,
        zone: Option<ZoneId>,
        source: LogSource,
        reason: Option<String>,
        clock: Clock,
        out: &mut Outcome,
    ) {
        self.state = CmsiState::EvacActive {
            manual,
            started_at: clock.wall,
            zone_id: zone.clone(),
        };
        self.outputs.uga_active = true;
        self.outputs.das_applied = true;
        self.outputs.evacuation_audible = true;
        self.outputs.manual_evacuation = manual;
        out.changed = true;

        let message = match (&reason, &zone) {
            (Some(reason), _) => format!("General evacuation started: {reason}"),
            (None, Some(zone)) => format!("General evacuation started from zone {zone}"),
            (None, None) => "General evacuation started".to_owned(),
        };
        out.log(
            LogEvent::at(clock.wall, source, LogEventKind::EvacuationStarted, message)
                .with_details(json!({ "manual": manual, "zone_id": zone, "reason": reason })),
        );
        self.log_outputs(clock, out);
    }

    fn log_outputs(&self, clock: Clock, out: &mut Outcome) {
        let (uga, das) = if self.outputs.uga_active {
            ("Diffusion units sounding general alarm", "Safety actuators commanded to safety position")
        } else {
            ("Diffusion units stopped", "Safety actuators released")
        };
        out.log(
            LogEvent::at(clock.wall, LogSource::Diffusion, LogEventKind::DiffusionChanged, uga)
                .with_details(json!({ "uga_active": self.outputs.uga_active })),
        );
        out.log(
            LogEvent::at(clock.wall, LogSource::Actuator, LogEventKind::ActuatorsChanged, das)
                .with_details(json!({ "das_applied": self.outputs.das_applied })),
        );
    }

    fn arm(&mut self, zone: &ZoneId, due: Instant, out: &mut Outcome) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.armed
            .insert(zone.clone(), ArmedDeadline { generation, due });
        out.timers.push(TimerOp::Arm {
            zone: zone.clone(),
            generation,
            due,
        });
    }

    fn disarm_all(&mut self, out: &mut Outcome) {
        for (zone, _) in self.armed.drain() {
            out.timers.push(TimerOp::Disarm { zone });
        }
    }
}

fn add_to_wall(wall: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| wall.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn machine(delay_ms: u64) -> Machine {
        Machine::new(DomainConfig {
            evac_delay_ms: delay_ms,
            ..DomainConfig::default()
        })
    }

    fn zone(name: &str) -> ZoneId {
        ZoneId::new(name)
    }

    fn armed_generation(out: &Outcome, zone: &ZoneId) -> u64 {
        out.timers
            .iter()
            .find_map(|op| match op {
                TimerOp::Arm {
                    zone: z,
                    generation,
                    ..
                } if z == zone => Some(*generation),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn manual_call_point_enters_pending() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.activate_manual_call_point(&zone("ZF1"), Clock::now(), &mut out);

        assert!(matches!(m.state(), CmsiState::EvacPending { zone_id, .. } if zone_id.as_str() == "ZF1"));
        assert!(out.changed);
        assert!(out.timers.iter().any(|op| matches!(op, TimerOp::Arm { .. })));
        assert!(
            out.events
                .iter()
                .any(|e| e.kind == LogEventKind::ManualCallPointActivated)
        );
    }

    #[test]
    fn deadline_for_pending_zone_starts_evacuation() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        let z = zone("ZF1");
        m.activate_manual_call_point(&z, Clock::now(), &mut out);
        let generation = armed_generation(&out, &z);

        let mut out = Outcome::default();
        m.deadline_elapsed(&z, generation, Clock::now(), &mut out);
        assert!(matches!(
            m.state(),
            CmsiState::EvacActive { manual: false, .. }
        ));
        let snap = m.publish(Utc::now());
        assert!(snap.outputs.uga_active && snap.outputs.das_applied);
    }

    #[test]
    fn retriggered_zone_invalidates_previous_deadline() {
        let mut m = machine(1_000);
        let z = zone("ZF1");
        let mut out = Outcome::default();
        m.activate_manual_call_point(&z, Clock::now(), &mut out);
        let first = armed_generation(&out, &z);

        let mut out = Outcome::default();
        m.activate_manual_call_point(&z, Clock::now(), &mut out);

        let mut out = Outcome::default();
        m.deadline_elapsed(&z, first, Clock::now(), &mut out);
        assert!(matches!(m.state(), CmsiState::EvacPending { .. }));
        assert!(!out.changed);
    }

    #[test]
    fn acknowledgement_freezes_remaining_time() {
        let mut m = machine(1_000);
        let z = zone("ZF1");
        let clock = Clock::now();
        let mut out = Outcome::default();
        m.activate_manual_call_point(&z, clock, &mut out);

        let mut out = Outcome::default();
        m.acknowledge_process(Some("op".into()), clock, &mut out);
        assert!(matches!(
            m.state(),
            CmsiState::EvacSuspended { remaining_ms: 1_000, .. }
        ));
        assert!(out.timers.contains(&TimerOp::Disarm { zone: z }));
    }

    #[test]
    fn acknowledgement_outside_pending_only_records() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.acknowledge_process(None, Clock::now(), &mut out);
        assert!(m.state().is_idle());
        let snap = m.publish(Utc::now());
        assert!(snap.acknowledgement.is_acked);
    }

    #[test]
    fn acknowledgement_does_not_suspend_when_not_required() {
        let mut m = Machine::new(DomainConfig {
            evac_delay_ms: 1_000,
            process_ack_required: false,
            ..DomainConfig::default()
        });
        let mut out = Outcome::default();
        m.activate_manual_call_point(&zone("ZF1"), Clock::now(), &mut out);
        m.acknowledge_process(None, Clock::now(), &mut out);
        assert!(matches!(m.state(), CmsiState::EvacPending { .. }));
    }

    #[test]
    fn reset_of_unknown_zone_is_a_no_op() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.reset_manual_call_point(&zone("NOPE"), Clock::now(), &mut out);
        m.reset_automatic_detector(&zone("NOPE"), Clock::now(), &mut out);
        assert!(!out.changed);
        assert!(out.events.is_empty());
    }

    #[test]
    fn reset_history_carries_into_next_activation() {
        let mut m = machine(1_000);
        let z = zone("ZF1");
        let mut out = Outcome::default();
        m.activate_manual_call_point(&z, Clock::now(), &mut out);
        let reset_clock = Clock::now();
        m.reset_manual_call_point(&z, reset_clock, &mut out);
        m.activate_manual_call_point(&z, Clock::now(), &mut out);

        let snap = m.publish(Utc::now());
        assert_eq!(snap.manual_call_points[0].last_reset_at, Some(reset_clock.wall));
    }

    #[test]
    fn reset_rejected_while_manual_call_point_latched() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.activate_automatic_detector(&zone("ZD1"), Clock::now(), &mut out);
        m.activate_manual_call_point(&zone("ZF1"), Clock::now(), &mut out);

        let err = m.try_system_reset(Clock::now(), &mut out).unwrap_err();
        assert_eq!(
            err,
            ResetRejected::ManualCallPointsLatched {
                zones: vec![zone("ZF1")]
            }
        );
    }

    #[test]
    fn active_detectors_block_reset_only_when_configured() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.activate_automatic_detector(&zone("ZD1"), Clock::now(), &mut out);
        assert!(matches!(
            m.try_system_reset(Clock::now(), &mut out),
            Err(ResetRejected::DetectorsActive { .. })
        ));

        m.update_config(
            &DomainConfigPatch {
                reset_requires_dai_clear: Some(false),
                ..Default::default()
            },
            Clock::now(),
            &mut out,
        );
        m.try_system_reset(Clock::now(), &mut out).unwrap();
        let snap = m.publish(Utc::now());
        assert!(snap.detectors.is_empty());
        assert!(snap.state.is_idle());
    }

    #[test]
    fn detector_without_evac_on_dai_raises_pre_alarm_only() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.activate_automatic_detector(&zone("ZD1"), Clock::now(), &mut out);
        assert!(m.state().is_idle());
        let snap = m.publish(Utc::now());
        assert!(snap.outputs.local_audible);
        assert!(!snap.outputs.uga_active);
    }

    #[test]
    fn detector_with_evac_on_dai_forces_evacuation() {
        let mut m = Machine::new(DomainConfig {
            evac_on_dai: true,
            ..DomainConfig::default()
        });
        let mut out = Outcome::default();
        m.activate_automatic_detector(&zone("ZD1"), Clock::now(), &mut out);
        assert!(matches!(
            m.state(),
            CmsiState::EvacActive { manual: false, zone_id: Some(z), .. } if z.as_str() == "ZD1"
        ));
    }

    #[test]
    fn detector_with_evac_on_dai_keeps_suspension() {
        let mut m = Machine::new(DomainConfig {
            evac_delay_ms: 1_000,
            evac_on_dai: true,
            ..DomainConfig::default()
        });
        let clock = Clock::now();
        let mut out = Outcome::default();
        m.activate_manual_call_point(&zone("ZF1"), clock, &mut out);
        m.acknowledge_process(None, clock, &mut out);

        let mut out = Outcome::default();
        m.activate_automatic_detector(&zone("ZD1"), Clock::now(), &mut out);
        assert!(matches!(
            m.state(),
            CmsiState::EvacSuspended { remaining_ms: 1_000, .. }
        ));
        assert!(
            out.events
                .iter()
                .any(|e| e.kind == LogEventKind::DetectorActivated)
        );
        assert!(!out.events.iter().any(|e| e.kind == LogEventKind::EvacuationStarted));
        let snap = m.publish(Utc::now());
        assert!(!snap.outputs.uga_active);
    }

    #[test]
    fn new_alarm_after_manual_stop_leaves_safe_hold() {
        let mut m = Machine::new(DomainConfig {
            evac_delay_ms: 1_000,
            evac_on_dai: true,
            ..DomainConfig::default()
        });
        let mut out = Outcome::default();
        m.stop_manual_evacuation(None, Clock::now(), &mut out);
        m.activate_manual_call_point(&zone("ZF1"), Clock::now(), &mut out);
        assert!(matches!(m.state(), CmsiState::EvacPending { zone_id, .. } if zone_id.as_str() == "ZF1"));

        m.stop_manual_evacuation(None, Clock::now(), &mut out);
        m.activate_automatic_detector(&zone("ZD1"), Clock::now(), &mut out);
        assert!(matches!(
            m.state(),
            CmsiState::EvacActive { manual: false, zone_id: Some(z), .. } if z.as_str() == "ZD1"
        ));
    }

    #[test]
    fn clearing_acknowledgement_keeps_suspension() {
        let mut m = machine(1_000);
        let clock = Clock::now();
        let mut out = Outcome::default();
        m.activate_manual_call_point(&zone("ZF1"), clock, &mut out);
        m.acknowledge_process(Some("op".into()), clock, &mut out);

        let cleared = Clock::now();
        let mut out = Outcome::default();
        m.clear_process_acknowledgement(cleared, &mut out);
        assert!(out.changed);
        assert!(out.timers.is_empty());
        assert!(
            out.events
                .iter()
                .any(|e| e.kind == LogEventKind::AcknowledgementCleared)
        );
        assert!(matches!(
            m.state(),
            CmsiState::EvacSuspended { remaining_ms: 1_000, .. }
        ));

        let snap = m.publish(Utc::now());
        assert!(!snap.acknowledgement.is_acked);
        assert_eq!(snap.acknowledgement.acked_by, None);
        assert_eq!(snap.acknowledgement.cleared_at, Some(cleared.wall));
    }

    #[test]
    fn silence_clears_local_pre_alarm() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.activate_automatic_detector(&zone("ZD1"), Clock::now(), &mut out);
        assert!(m.publish(Utc::now()).outputs.local_audible);

        let mut out = Outcome::default();
        m.silence_audible_alarm(Clock::now(), &mut out);
        assert!(out.changed);
        assert!(out.events.iter().any(|e| e.kind == LogEventKind::AudibleSilenced));
        let snap = m.publish(Utc::now());
        assert!(!snap.outputs.local_audible);
        assert!(!snap.outputs.evacuation_audible);
        assert!(snap.state.is_idle());
    }

    #[test]
    fn silence_is_a_no_op_when_quiet() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.silence_audible_alarm(Clock::now(), &mut out);
        assert!(!out.changed);

        m.start_manual_evacuation(None, Clock::now(), &mut out);
        let mut out = Outcome::default();
        m.silence_audible_alarm(Clock::now(), &mut out);
        assert!(out.changed);
        let snap = m.publish(Utc::now());
        assert!(!snap.outputs.evacuation_audible);
        assert!(snap.outputs.uga_active);
    }

    #[test]
    fn manual_start_and_stop() {
        let mut m = machine(1_000);
        let mut out = Outcome::default();
        m.start_manual_evacuation(Some("drill".into()), Clock::now(), &mut out);
        assert!(matches!(m.state(), CmsiState::EvacActive { manual: true, .. }));

        m.stop_manual_evacuation(Some("done".into()), Clock::now(), &mut out);
        assert!(matches!(m.state(), CmsiState::SafeHold { .. }));
        let snap = m.publish(Utc::now());
        assert_eq!(snap.outputs, AlarmOutputs::default());
    }
}
