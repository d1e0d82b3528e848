// ── Evacuation core ──
//
// Owns the canonical unit state. Every command locks the state, runs one
// transition of the machine, applies the resulting timer operations,
// publishes the new snapshot and log events, then unlocks. Observers
// therefore never see a partial mutation and log events arrive in
// mutation order.

mod machine;
mod timer;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::machine::{Clock, Machine, Outcome, TimerOp};
use crate::command::{Command, CommandResult};
use crate::config::{DomainConfig, DomainConfigPatch};
use crate::error::{CoreError, ResetRejected};
use crate::model::{CmsiSnapshot, LogEvent, ZoneId};
use crate::stream::SnapshotStream;

const LOG_CHANNEL_SIZE: usize = 256;

/// Handle to the simulated control unit.
///
/// Cheaply cloneable; all clones drive the same unit. Commands are
/// synchronous, but commands that arm a deadline spawn a Tokio task and
/// must therefore be issued from within a Tokio runtime.
#[derive(Clone)]
pub struct EvacuationCore {
    inner: Arc<CoreInner>,
}

pub(crate) struct CoreInner {
    state: Mutex<CoreState>,
    snapshot_tx: watch::Sender<Arc<CmsiSnapshot>>,
    log_tx: broadcast::Sender<Arc<LogEvent>>,
    /// Parent of every deadline token.
    cancel: CancellationToken,
}

struct CoreState {
    machine: Machine,
    /// Token of the deadline task currently armed for each zone.
    timers: HashMap<ZoneId, CancellationToken>,
    shut_down: bool,
}

impl EvacuationCore {
    pub fn new(config: DomainConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(CmsiSnapshot::initial(config.clone())));
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_SIZE);

        Self {
            inner: Arc::new(CoreInner {
                state: Mutex::new(CoreState {
                    machine: Machine::new(config),
                    timers: HashMap::new(),
                    shut_down: false,
                }),
                snapshot_tx,
                log_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    // ── Manual call points ───────────────────────────────────────────

    pub fn activate_manual_call_point(&self, zone: &ZoneId) {
        self.inner.apply("activate_manual_call_point", |m, clock, out| {
            m.activate_manual_call_point(zone, clock, out);
        });
    }

    pub fn reset_manual_call_point(&self, zone: &ZoneId) {
        self.inner.apply("reset_manual_call_point", |m, clock, out| {
            m.reset_manual_call_point(zone, clock, out);
        });
    }

    // ── Automatic detectors ──────────────────────────────────────────

    pub fn activate_automatic_detector(&self, zone: &ZoneId) {
        self.inner.apply("activate_automatic_detector", |m, clock, out| {
            m.activate_automatic_detector(zone, clock, out);
        });
    }

    pub fn reset_automatic_detector(&self, zone: &ZoneId) {
        self.inner.apply("reset_automatic_detector", |m, clock, out| {
            m.reset_automatic_detector(zone, clock, out);
        });
    }

    // ── Process ──────────────────────────────────────────────────────

    /// Record an operator acknowledgement. While a countdown is pending it
    /// freezes the remaining time and suspends the evacuation.
    pub fn acknowledge_process(&self, acked_by: Option<String>) {
        self.inner.apply("acknowledge_process", |m, clock, out| {
            m.acknowledge_process(acked_by, clock, out);
        });
    }

    pub fn clear_process_acknowledgement(&self) {
        self.inner.apply("clear_process_acknowledgement", |m, clock, out| {
            m.clear_process_acknowledgement(clock, out);
        });
    }

    /// Silence the audible outputs. Publishes nothing when already quiet.
    pub fn silence_audible_alarm(&self) {
        self.inner.apply("silence_audible_alarm", |m, clock, out| {
            m.silence_audible_alarm(clock, out);
        });
    }

    // ── Evacuation ───────────────────────────────────────────────────

    /// Force general evacuation, whatever the current state.
    pub fn start_manual_evacuation(&self, reason: Option<String>) {
        self.inner.apply("start_manual_evacuation", |m, clock, out| {
            m.start_manual_evacuation(reason, clock, out);
        });
    }

    /// Stop evacuation and hold the unit in safe hold until reset.
    pub fn stop_manual_evacuation(&self, reason: Option<String>) {
        self.inner.apply("stop_manual_evacuation", |m, clock, out| {
            m.stop_manual_evacuation(reason, clock, out);
        });
    }

    /// Return the unit to idle.
    ///
    /// Refused while any manual call point is latched, and while any
    /// automatic detector is active when `reset_requires_dai_clear` is set.
    /// After [`shutdown()`](Self::shutdown) this does nothing and returns
    /// `Ok(())`.
    pub fn try_system_reset(&self) -> Result<(), ResetRejected> {
        self.inner
            .apply("try_system_reset", Machine::try_system_reset)
            .unwrap_or(Ok(()))
    }

    /// Merge `patch` into the running configuration. Deadlines already
    /// armed keep their original due time.
    pub fn update_config(&self, patch: &DomainConfigPatch) {
        self.inner.apply("update_config", |m, clock, out| {
            m.update_config(patch, clock, out);
        });
    }

    /// Route a typed command.
    pub fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        let name = cmd.name();
        let result = self.inner.apply(name, |m, clock, out| {
            match cmd {
                Command::ActivateManualCallPoint { zone_id } => {
                    m.activate_manual_call_point(&zone_id, clock, out);
                }
                Command::ResetManualCallPoint { zone_id } => {
                    m.reset_manual_call_point(&zone_id, clock, out);
                }
                Command::ActivateAutomaticDetector { zone_id } => {
                    m.activate_automatic_detector(&zone_id, clock, out);
                }
                Command::ResetAutomaticDetector { zone_id } => {
                    m.reset_automatic_detector(&zone_id, clock, out);
                }
                Command::AcknowledgeProcess { acked_by } => {
                    m.acknowledge_process(acked_by, clock, out);
                }
                Command::ClearProcessAcknowledgement => {
                    m.clear_process_acknowledgement(clock, out);
                }
                Command::SilenceAudibleAlarm => m.silence_audible_alarm(clock, out),
                Command::StartManualEvacuation { reason } => {
                    m.start_manual_evacuation(reason, clock, out);
                }
                Command::StopManualEvacuation { reason } => {
                    m.stop_manual_evacuation(reason, clock, out);
                }
                Command::TrySystemReset => {
                    if let Err(rejected) = m.try_system_reset(clock, out) {
                        return CommandResult::ResetRejected(rejected);
                    }
                }
                Command::UpdateConfig(patch) => m.update_config(&patch, clock, out),
            }
            CommandResult::Ok
        });
        result.ok_or(CoreError::CoreShutDown)
    }

    /// Append an externally produced event (trainer, trainee, scenario
    /// runner) to the unit's log stream.
    pub fn append_log(&self, event: LogEvent) {
        let guard = self.inner.state.lock();
        if guard.shut_down {
            debug!(kind = %event.kind, "evacuation core shut down, log event dropped");
            return;
        }
        let _ = self.inner.log_tx.send(Arc::new(event));
        drop(guard);
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<CmsiSnapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot publications.
    pub fn snapshots(&self) -> SnapshotStream<CmsiSnapshot> {
        SnapshotStream::new(self.inner.snapshot_tx.subscribe())
    }

    /// Subscribe to the log stream. Only events appended after this call
    /// are delivered.
    pub fn log_events(&self) -> broadcast::Receiver<Arc<LogEvent>> {
        self.inner.log_tx.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shut_down
    }

    /// Cancel every armed deadline and refuse further commands.
    pub fn shutdown(&self) {
        let mut guard = self.inner.state.lock();
        if guard.shut_down {
            return;
        }
        guard.shut_down = true;
        guard.timers.clear();
        self.inner.cancel.cancel();
        info!("evacuation core shut down");
    }
}

impl CoreInner {
    /// Run one machine transition under the lock and commit its outcome.
    /// Returns `None` when the core has been shut down.
    fn apply<R>(
        self: &Arc<Self>,
        command: &'static str,
        op: impl FnOnce(&mut Machine, Clock, &mut Outcome) -> R,
    ) -> Option<R> {
        let mut guard = self.state.lock();
        if guard.shut_down {
            warn!(command, "evacuation core shut down, command ignored");
            return None;
        }

        let clock = Clock::now();
        let mut out = Outcome::default();
        let result = op(&mut guard.machine, clock, &mut out);
        debug!(
            command,
            state = guard.machine.state().label(),
            events = out.events.len(),
            "command applied"
        );
        self.commit(&mut guard, clock, out);
        Some(result)
    }

    pub(super) fn deadline_elapsed(self: &Arc<Self>, zone: &ZoneId, generation: u64) {
        let mut guard = self.state.lock();
        if guard.shut_down {
            return;
        }
        let clock = Clock::now();
        let mut out = Outcome::default();
        guard.machine.deadline_elapsed(zone, generation, clock, &mut out);
        if out.changed {
            info!(zone = %zone, generation, "evacuation deadline elapsed, general evacuation");
        }
        self.commit(&mut guard, clock, out);
    }

    fn commit(self: &Arc<Self>, state: &mut CoreState, clock: Clock, out: Outcome) {
        for op in out.timers {
            match op {
                TimerOp::Arm {
                    zone,
                    generation,
                    due,
                } => {
                    let token = self.cancel.child_token();
                    if let Some(previous) = state.timers.insert(zone.clone(), token.clone()) {
                        previous.cancel();
                    }
                    debug!(zone = %zone, generation, "deadline armed");
                    tokio::spawn(timer::deadline_task(
                        Arc::downgrade(self),
                        zone,
                        generation,
                        due,
                        token,
                    ));
                }
                TimerOp::Disarm { zone } => {
                    if let Some(token) = state.timers.remove(&zone) {
                        token.cancel();
                    }
                }
            }
        }

        if out.changed {
            let snapshot = state.machine.publish(clock.wall);
            self.snapshot_tx.send_replace(Arc::new(snapshot));
        }

        for event in out.events {
            // No subscribers is fine; the journal is fire-and-forget here.
            let _ = self.log_tx.send(Arc::new(event));
        }
    }
}

impl Drop for CoreInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{CmsiState, LogEventKind, LogSource};

    fn core(delay_ms: u64) -> EvacuationCore {
        EvacuationCore::new(DomainConfig {
            evac_delay_ms: delay_ms,
            ..DomainConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_task_drives_evacuation() {
        let core = core(500);
        let zone = ZoneId::new("ZF1");
        core.activate_manual_call_point(&zone);
        assert_eq!(core.snapshot().state.label(), "EVAC_PENDING");

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert!(matches!(
            core.snapshot().state,
            CmsiState::EvacActive { manual: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_deadlines_and_rejects_commands() {
        let core = core(500);
        core.activate_manual_call_point(&ZoneId::new("ZF1"));
        core.shutdown();
        assert!(core.is_shut_down());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(core.snapshot().state.label(), "EVAC_PENDING");
        assert!(matches!(
            core.execute(Command::SilenceAudibleAlarm),
            Err(CoreError::CoreShutDown)
        ));
    }

    #[tokio::test]
    async fn execute_reports_reset_rejection() {
        let core = core(60_000);
        core.execute(Command::ActivateManualCallPoint {
            zone_id: ZoneId::new("ZF2"),
        })
        .unwrap();
        let result = core.execute(Command::TrySystemReset).unwrap();
        assert!(matches!(
            result,
            CommandResult::ResetRejected(ResetRejected::ManualCallPointsLatched { .. })
        ));
    }

    #[tokio::test]
    async fn appended_events_reach_subscribers() {
        let core = core(60_000);
        let mut rx = core.log_events();
        core.append_log(LogEvent::new(LogSource::Trainer, LogEventKind::Note, "briefing"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.message, "briefing");
    }

    #[tokio::test]
    async fn silent_no_op_publishes_nothing() {
        let core = core(60_000);
        let before = core.snapshot().revision;
        core.silence_audible_alarm();
        assert_eq!(core.snapshot().revision, before);
    }
}
